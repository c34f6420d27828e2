pub mod cpu;
pub mod list;
pub mod stat;

use std::path::Path;

use topdown_core::{MetricData, MetricInstance, detect_cpu};

/// Catalog selection shared by the subcommands.
pub struct CatalogSource<'a> {
    pub metrics: Option<&'a str>,
    pub cpu: Option<&'a str>,
    pub metrics_dir: &'a str,
}

/// Load the catalog named by `--metrics`, or the one for `--cpu`, or the one
/// for the CPU this machine runs on.
pub fn load_catalog(source: &CatalogSource<'_>) -> Result<MetricData, String> {
    if let Some(path) = source.metrics {
        return MetricData::load(Path::new(path)).map_err(|e| e.to_string());
    }

    let dir = Path::new(source.metrics_dir);
    let cpu = match source.cpu {
        Some(cpu) => cpu.to_string(),
        None => match detect_cpu(dir) {
            Ok(Some(cpu)) => {
                log::info!("Detected CPU {cpu}");
                cpu
            }
            Ok(None) => {
                return Err("Could not detect CPU. Specify --cpu or --metrics.".to_string());
            }
            Err(e) => return Err(e.to_string()),
        },
    };
    MetricData::for_cpu(dir, &cpu).map_err(|e| e.to_string())
}

/// Metric instances for the requested names. Each name may be a group (all of
/// its metrics) or a single metric. No names selects everything.
pub fn select_metrics(data: &MetricData, names: &[String]) -> Result<Vec<MetricInstance>, String> {
    if names.is_empty() {
        return Ok(data.all_metrics());
    }

    let mut out: Vec<MetricInstance> = Vec::new();
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let found = data
            .metrics_for_group(name)
            .unwrap_or_else(|| data.instances_of_metric(name));
        if found.is_empty() {
            let suggestion = data
                .close_group_match(name)
                .or_else(|| data.close_metric_match(name))
                .map(|s| format!(" Did you mean \"{s}\"?"))
                .unwrap_or_default();
            return Err(format!(
                "\"{name}\" is not a valid group or metric.{suggestion}"
            ));
        }
        for instance in found {
            if !out.contains(&instance) {
                out.push(instance);
            }
        }
    }
    Ok(out)
}
