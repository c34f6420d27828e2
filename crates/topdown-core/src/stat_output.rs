//! Parser for `perf stat -x <sep>` output files.
//!
//! Two line shapes are produced, depending on whether `-I` was given:
//!
//! ```text
//! 139198;;BR_PRED:u;800440;100.00;;                 (non-interval, 7 fields)
//! 0.100116703;178;;ITLB_WALK;96758700;100.00;;      (interval, 8 fields)
//! ```
//!
//! Lines starting with `#` and blank lines are skipped.

use std::path::Path;

use crate::error::{CollectError, StatParseError};

/// Field separator passed to `perf stat -x`.
pub const PERF_SEPARATOR: &str = ";";

const NOT_COUNTED: &str = "<not counted>";
const NOT_SUPPORTED: &str = "<not supported>";

/// Which `perf stat` line shape to expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerfStatFormat {
    NonInterval,
    Interval,
}

impl PerfStatFormat {
    fn field_count(self) -> usize {
        match self {
            Self::NonInterval => 7,
            Self::Interval => 8,
        }
    }
}

/// One parsed perf output row.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    /// Event name with any `:modifier` suffix removed.
    pub event: String,
    /// Count, or `None` for `<not counted>` / `<not supported>`.
    pub value: Option<f64>,
    /// Interval timestamp in seconds (interval format only).
    pub time: Option<f64>,
}

/// Convert `EVENT_NAME:modifier` to `EVENT_NAME`.
fn strip_modifier(event: &str) -> &str {
    event.split_once(':').map_or(event, |(name, _)| name)
}

fn parse_count(count: &str, event: &str) -> Result<Option<f64>, String> {
    match count {
        NOT_COUNTED => {
            log::info!("Perf event {event} was not counted");
            Ok(None)
        }
        NOT_SUPPORTED => {
            log::info!(
                "Perf event {event} was not supported. --max-events too big or not specified?"
            );
            Ok(None)
        }
        _ => {
            if count == "0" {
                log::info!("Perf counted 0 {event} events");
            }
            count
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("invalid count {count:?}"))
        }
    }
}

/// Parse a single (non-comment, non-blank) output line.
pub fn parse_line(line: &str, format: PerfStatFormat) -> Result<StatRow, String> {
    parse_line_with_separator(line, format, PERF_SEPARATOR)
}

/// Parse a line written with a separator other than [`PERF_SEPARATOR`].
pub fn parse_line_with_separator(
    line: &str,
    format: PerfStatFormat,
    separator: &str,
) -> Result<StatRow, String> {
    let fields: Vec<&str> = line.split(separator).collect();
    if fields.len() != format.field_count() {
        return Err(format!(
            "expected {} fields, found {}",
            format.field_count(),
            fields.len()
        ));
    }

    let (time, count, event) = match format {
        PerfStatFormat::Interval => {
            let time = fields[0]
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("invalid timestamp {:?}", fields[0]))?;
            (Some(time), fields[1], fields[3])
        }
        PerfStatFormat::NonInterval => (None, fields[0], fields[2]),
    };

    let value = parse_count(count, event)?;
    Ok(StatRow {
        event: strip_modifier(event).to_string(),
        value,
        time,
    })
}

/// Parse perf stat output text, preserving line order.
pub fn parse_perf_stat_output(text: &str, format: PerfStatFormat) -> Result<Vec<StatRow>, StatParseError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|(idx, line)| {
            parse_line(line, format).map_err(|reason| StatParseError {
                line_no: idx + 1,
                line: line.to_string(),
                reason,
            })
        })
        .collect()
}

/// Read and parse a perf stat output file.
pub fn read_perf_stat_output(path: &Path, format: PerfStatFormat) -> Result<Vec<StatRow>, CollectError> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_perf_stat_output(&text, format)?)
}
