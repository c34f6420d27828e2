//! CLI for topdown-tool: collect topdown metric events with perf stat.

mod commands;

use clap::{Args, Parser, Subcommand};
use topdown_core::CollectBy;

#[derive(Parser)]
#[command(name = "topdown-tool")]
#[command(about = "topdown-tool: count the PMU events behind topdown metrics with perf stat")]
#[command(version = topdown_core::VERSION)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the metric catalog comes from.
#[derive(Args)]
struct CatalogArgs {
    /// Metric catalog JSON file (overrides --cpu)
    #[arg(long)]
    metrics: Option<String>,

    /// CPU name, e.g. neoverse-n1. Detected from the MIDR when omitted.
    #[arg(long)]
    cpu: Option<String>,

    /// Directory holding <cpu>.json catalogs and mapping.json
    #[arg(long, default_value = "metrics")]
    metrics_dir: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Count the events of the selected metrics, over as many perf runs as needed
    Stat {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Comma-separated metric groups (or metrics) to collect; default: all
        #[arg(short = 'm', long = "metric-group", value_delimiter = ',')]
        metric_groups: Vec<String>,

        /// Collect events for all CPUs
        #[arg(short, long)]
        all_cpus: bool,

        /// Comma-separated PIDs to monitor
        #[arg(short, long = "pid", value_delimiter = ',', conflicts_with = "command")]
        pids: Vec<u32>,

        /// Maximum simultaneous events (capped at the PMU counter count)
        #[arg(long)]
        max_events: Option<usize>,

        /// Which events must be counted in the same run
        #[arg(short, long, default_value = "metric")]
        collect_by: CollectBy,

        /// Pass event names to perf instead of raw event codes
        #[arg(long)]
        use_event_names: bool,

        /// Extra arguments for perf stat
        #[arg(long, default_value = "")]
        perf_args: String,

        /// File perf writes its counts to
        #[arg(long, default_value = "perf.stat.txt")]
        perf_output: String,

        /// Sample interval in milliseconds
        #[arg(short = 'I', long)]
        interval: Option<u64>,

        /// perf executable
        #[arg(long, default_value = "perf")]
        perf: String,

        /// Write the collected counts as JSON
        #[arg(long)]
        json: Option<String>,

        /// Command to profile (omit for system-wide or PID monitoring)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// List the metric groups of the catalog
    ListGroups {
        #[command(flatten)]
        catalog: CatalogArgs,
    },

    /// List metrics with their events and formulas
    ListMetrics {
        #[command(flatten)]
        catalog: CatalogArgs,

        /// Comma-separated metric groups to list; default: all
        #[arg(short = 'm', long = "metric-group", value_delimiter = ',')]
        metric_groups: Vec<String>,
    },

    /// List the CPUs that have a metric catalog
    ListCpus {
        /// Directory holding <cpu>.json catalogs
        #[arg(long, default_value = "metrics")]
        metrics_dir: String,
    },

    /// Print the CPU detected from the MIDR
    Cpu {
        /// Directory holding mapping.json
        #[arg(long, default_value = "metrics")]
        metrics_dir: String,
    },
}

fn init_logging(verbose: bool, debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);

    match cli.command {
        Commands::Stat {
            catalog,
            metric_groups,
            all_cpus,
            pids,
            max_events,
            collect_by,
            use_event_names,
            perf_args,
            perf_output,
            interval,
            perf,
            json,
            command,
        } => commands::stat::run(commands::stat::StatCommandConfig {
            catalog: catalog.source(),
            metric_groups: &metric_groups,
            all_cpus,
            pids,
            max_events,
            collect_by,
            use_event_names,
            perf_args,
            perf_output: &perf_output,
            interval,
            perf,
            json_path: json.as_deref(),
            command,
        }),
        Commands::ListGroups { catalog } => commands::list::run_groups(&catalog.source()),
        Commands::ListMetrics {
            catalog,
            metric_groups,
        } => commands::list::run_metrics(&catalog.source(), &metric_groups),
        Commands::ListCpus { metrics_dir } => commands::list::run_cpus(&metrics_dir),
        Commands::Cpu { metrics_dir } => commands::cpu::run(&metrics_dir),
    }
}

impl CatalogArgs {
    fn source(&self) -> commands::CatalogSource<'_> {
        commands::CatalogSource {
            metrics: self.metrics.as_deref(),
            cpu: self.cpu.as_deref(),
            metrics_dir: &self.metrics_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("topdown-tool").chain(args.iter().copied()))
    }

    #[test]
    fn test_collect_by_parsed_into_enum() {
        match parse(&["stat", "-c", "group", "sleep", "1"]).unwrap().command {
            Commands::Stat {
                collect_by,
                command,
                ..
            } => {
                assert_eq!(collect_by, CollectBy::Group);
                assert_eq!(command, vec!["sleep", "1"]);
            }
            _ => panic!("expected stat"),
        }
    }

    #[test]
    fn test_collect_by_defaults_to_metric() {
        match parse(&["stat", "true"]).unwrap().command {
            Commands::Stat { collect_by, .. } => assert_eq!(collect_by, CollectBy::Metric),
            _ => panic!("expected stat"),
        }
    }

    #[test]
    fn test_collect_by_rejects_unknown_mode() {
        assert!(parse(&["stat", "--collect-by", "bogus", "true"]).is_err());
    }

    #[test]
    fn test_pid_and_command_conflict() {
        assert!(parse(&["stat", "-p", "1,2"]).is_ok());
        assert!(parse(&["stat", "-p", "1", "sleep", "1"]).is_err());
    }

    #[test]
    fn test_command_keeps_its_own_flags() {
        match parse(&["stat", "-I", "100", "ls", "-l"]).unwrap().command {
            Commands::Stat {
                interval, command, ..
            } => {
                assert_eq!(interval, Some(100));
                assert_eq!(command, vec!["ls", "-l"]);
            }
            _ => panic!("expected stat"),
        }
    }
}
