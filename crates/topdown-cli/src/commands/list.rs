//! `topdown-tool list-groups` / `list-metrics` / `list-cpus`: show catalog contents.

use std::path::Path;

use topdown_core::{MetricData, MetricInstance, list_cpus};

use super::{CatalogSource, load_catalog, select_metrics};

fn load_or_exit(source: &CatalogSource<'_>) -> MetricData {
    match load_catalog(source) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

pub fn run_groups(source: &CatalogSource<'_>) {
    let data = load_or_exit(source);
    let groups = data.list_groups();

    println!("{} metric group(s):\n", groups.len());
    for g in groups {
        println!("  {:<30} {}", g.name, g.title);
        if !g.description.is_empty() {
            println!("  {:<30} {}", "", g.description);
        }
    }
}

pub fn run_metrics(source: &CatalogSource<'_>, metric_groups: &[String]) {
    let data = load_or_exit(source);
    let instances = match select_metrics(&data, metric_groups) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let mut current_group = None;
    for instance in &instances {
        if current_group != Some(&instance.group.name) {
            println!("\n{}:", instance.group.title);
            current_group = Some(&instance.group.name);
        }
        print!("{}", describe_metric(instance));
    }
}

pub fn run_cpus(metrics_dir: &str) {
    match list_cpus(Path::new(metrics_dir)) {
        Ok(cpus) => {
            for cpu in cpus {
                println!("{cpu}");
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

/// Metric name, title, formula and events, as listed by `list-metrics`.
pub fn describe_metric(instance: &MetricInstance) -> String {
    let m = &instance.metric;
    let events: Vec<&str> = m.events.iter().map(|e| e.name.as_str()).collect();
    let mut out = format!("  {:<30} {}\n", m.name, m.title);
    if !m.formula.is_empty() {
        out.push_str(&format!("  {:<30} = {}\n", "", m.formula));
    }
    out.push_str(&format!("  {:<30} events: {}\n", "", events.join(", ")));
    out
}
