//! `topdown-tool stat`: count the events behind the selected metrics.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use topdown_core::{
    CollectBy, CollectError, EventCount, PerfOptions, ScheduleError, SystemPerfRunner,
    TimedEventCounts, collect_events,
};

use super::{CatalogSource, load_catalog, select_metrics};

pub struct StatCommandConfig<'a> {
    pub catalog: CatalogSource<'a>,
    pub metric_groups: &'a [String],
    pub all_cpus: bool,
    pub pids: Vec<u32>,
    pub max_events: Option<usize>,
    pub collect_by: CollectBy,
    pub use_event_names: bool,
    pub perf_args: String,
    pub perf_output: &'a str,
    pub interval: Option<u64>,
    pub perf: String,
    pub json_path: Option<&'a str>,
    pub command: Vec<String>,
}

/// Run the stat command.
pub fn run(config: StatCommandConfig<'_>) {
    let data = match load_catalog(&config.catalog) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let instances = match select_metrics(&data, config.metric_groups) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if instances.is_empty() {
        eprintln!("No metrics to collect.");
        std::process::exit(1);
    }

    let options = PerfOptions {
        command: config.command,
        all_cpus: config.all_cpus,
        pids: config.pids,
        max_events: config.max_events,
        collect_by: config.collect_by,
        use_event_names: config.use_event_names,
        perf_args: config.perf_args,
        perf_output: PathBuf::from(config.perf_output),
        interval: config.interval,
        perf: config.perf,
    };

    // perf gets the same SIGINT and flushes its counts; we only note that it happened.
    let mut runner = SystemPerfRunner::default();
    let flag = runner.interrupt_flag();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        eprintln!("Error setting Ctrl-C handler: {e}");
        std::process::exit(1);
    }

    let results = match collect_events(&instances, &options, &mut runner) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", error_message(&e));
            std::process::exit(1);
        }
    };

    print_results(&results);

    if let Some(path) = config.json_path {
        match serde_json::to_string_pretty(&results_json(&results)) {
            Ok(text) => match std::fs::write(path, text) {
                Ok(()) => println!("\nResults written to {path}"),
                Err(e) => eprintln!("\nFailed to write {path}: {e}"),
            },
            Err(e) => eprintln!("\nFailed to serialize results: {e}"),
        }
    }
}

/// User-facing message for a collection failure.
pub fn error_message(err: &CollectError) -> String {
    match err {
        CollectError::Schedule(e @ ScheduleError::Group { group, .. }) => format!(
            "The \"{group}\" group contains {} unique events, but only {} can be collected at once.\n\n\
             Choose different groups/metrics or avoid collecting by group.",
            e.events().len(),
            e.available()
        ),
        CollectError::Schedule(e @ ScheduleError::Metric { metric, .. }) => format!(
            "The \"{metric}\" metric contains {} unique events, but only {} can be collected at once.\n\n\
             Choose different metrics or avoid collecting by metric.",
            e.events().len(),
            e.available()
        ),
        CollectError::ToolFailed { command, status } => match status.code() {
            Some(code) => format!("\"{command}\" finished with exit code {code}."),
            None => format!("\"{command}\" finished with {status}."),
        },
        CollectError::UncountedEvents(events) => format!(
            "The following events could not be counted:\n  {}\n\n\
             If your program completes very quickly, try running one that takes longer to complete.",
            events.join("\n  ")
        ),
        CollectError::ZeroCycles => {
            "No cycles were counted. Make sure the profiled program runs long enough.".to_string()
        }
        other => other.to_string(),
    }
}

/// A count as printed: integral counts without decimals, missing ones as perf shows them.
pub fn format_count(value: Option<f64>) -> String {
    match value {
        None => "<not counted>".to_string(),
        Some(v) if v.fract() == 0.0 => format!("{v:.0}"),
        Some(v) => format!("{v:.2}"),
    }
}

fn print_counts(counts: &[EventCount]) {
    let mut last_time = None;
    for c in counts {
        if c.time.is_some() && c.time != last_time {
            if let Some(t) = c.time {
                println!("\n  time {t:.3}s");
            }
            last_time = c.time;
        }
        println!(
            "  {:>20}  {}",
            format_count(c.value),
            c.event.qualified_name()
        );
    }
}

fn print_results(results: &[TimedEventCounts]) {
    for (i, (_, counts)) in results.iter().enumerate() {
        println!();
        println!("Run {} of {} ({} events)", i + 1, results.len(), counts.len());
        print_counts(counts);
    }
}

fn results_json(results: &[TimedEventCounts]) -> serde_json::Value {
    serde_json::Value::Array(
        results
            .iter()
            .map(|(time, counts)| {
                serde_json::json!({
                    "time": time,
                    "counts": counts,
                })
            })
            .collect(),
    )
}
