//! CPU identification from the Arm Main ID Register (MIDR).
//!
//! The catalog for a CPU is chosen by a CPU id built from the MIDR implementer
//! and part number fields, looked up in a `mapping.json` next to the catalogs:
//!
//! ```json
//! { "0x41d0c": { "name": "Neoverse N1" } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::CatalogError;

/// sysfs location of the first CPU's MIDR on Linux.
pub const MIDR_PATH: &str = "/sys/devices/system/cpu/cpu0/regs/identification/midr_el1";

/// File name of the CPU id → catalog name mapping.
pub const MAPPING_FILE: &str = "mapping.json";

#[derive(Deserialize)]
struct MappingEntry {
    name: String,
}

/// Read the MIDR of the first CPU (best-effort).
pub fn read_midr() -> std::io::Result<String> {
    #[cfg(target_os = "linux")]
    {
        let s = std::fs::read_to_string(MIDR_PATH)?;
        Ok(s.lines().next().unwrap_or("").trim().to_string())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "MIDR detection is only supported on Linux",
        ))
    }
}

/// CPU id from a hex MIDR string: `(implementer << 12) + part_num`.
pub fn cpu_id_from_midr(midr: &str) -> Option<u32> {
    let midr = midr.trim();
    let hex = midr
        .strip_prefix("0x")
        .or_else(|| midr.strip_prefix("0X"))
        .unwrap_or(midr);
    let midr = u64::from_str_radix(hex, 16).ok()?;
    let implementer = ((midr & 0xff00_0000) >> 24) as u32;
    let part_num = ((midr & 0x0000_fff0) >> 4) as u32;
    Some((implementer << 12) + part_num)
}

/// Parse a CPU mapping document into `cpu id → catalog name`.
///
/// Names are normalised the way catalog files are named: lowercase, with
/// spaces replaced by hyphens.
pub fn parse_cpu_mapping(text: &str) -> Result<BTreeMap<u32, String>, CatalogError> {
    let raw: BTreeMap<String, MappingEntry> = serde_json::from_str(text)?;
    let mut out = BTreeMap::new();
    for (id, entry) in raw {
        let trimmed = id.trim_start_matches("0x").trim_start_matches("0X");
        match u32::from_str_radix(trimmed, 16) {
            Ok(cpu_id) => {
                out.insert(cpu_id, entry.name.to_lowercase().replace(' ', "-"));
            }
            Err(_) => log::warn!("ignoring CPU mapping entry with invalid id {id:?}"),
        }
    }
    Ok(out)
}

/// Load `<dir>/mapping.json`.
pub fn read_cpu_mapping(dir: &Path) -> Result<BTreeMap<u32, String>, CatalogError> {
    let path = dir.join(MAPPING_FILE);
    let text = std::fs::read_to_string(&path).map_err(|source| CatalogError::Io {
        path: path.clone(),
        source,
    })?;
    parse_cpu_mapping(&text)
}

/// Catalog name for the CPU this process is running on, if it is known.
pub fn detect_cpu(metrics_dir: &Path) -> Result<Option<String>, CatalogError> {
    let midr = match read_midr() {
        Ok(m) => m,
        Err(e) => {
            log::info!("Could not read MIDR: {e}");
            return Ok(None);
        }
    };
    let Some(cpu_id) = cpu_id_from_midr(&midr) else {
        log::info!("Could not parse MIDR {midr:?}");
        return Ok(None);
    };
    log::debug!("MIDR {midr} -> CPU id 0x{cpu_id:x}");
    Ok(read_cpu_mapping(metrics_dir)?.remove(&cpu_id))
}
