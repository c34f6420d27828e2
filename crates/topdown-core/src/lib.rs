//! # topdown-core
//!
//! **Collect topdown metric events with `perf stat`, within the PMU counter limit.**
//!
//! A CPU exposes only a handful of general purpose PMU counters. Metrics often
//! need more events than that, so `topdown-core` schedules the events over as
//! many `perf stat` runs as needed, parses perf's output and maps every count
//! back to the metric (or metric group) that asked for it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use topdown_core::{MetricData, PerfOptions, SystemPerfRunner, collect_events};
//!
//! let data = MetricData::load(Path::new("metrics/neoverse-n1.json")).unwrap();
//! let metrics = data.metrics_for_group("Cycle_Accounting").unwrap();
//!
//! let options = PerfOptions {
//!     command: vec!["sleep".into(), "1".into()],
//!     ..Default::default()
//! };
//! let mut runner = SystemPerfRunner::default();
//! for (time, counts) in collect_events(&metrics, &options, &mut runner).unwrap() {
//!     for c in counts {
//!         println!("{time:?} {} = {:?}", c.event.qualified_name(), c.value);
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! Catalog → CollectionEvents → Scheduler → (per run) perf stat → Parser → Reconciler
//!
//! Three grouping modes decide which events must share a run:
//! - **None**: every event is scheduled on its own.
//! - **Metric** (default): all events of a metric run together.
//! - **Group**: all events of a metric group run together.
//!
//! Launching perf goes through the [`PerfRunner`] trait, so the whole pipeline
//! can be driven with canned perf output.

pub mod catalog;
pub mod collect;
pub mod cpu;
pub mod error;
pub mod event;
pub mod perf;
pub mod schedule;
pub mod stat_output;

pub use catalog::{Group, Metric, MetricData, MetricInstance, list_cpus};
pub use collect::{
    CYCLES_EVENT, TimedEventCounts, check_multi_run, collect_events, reconcile, run_session,
    validate_counts,
};
pub use cpu::{cpu_id_from_midr, detect_cpu, read_cpu_mapping};
pub use error::{CatalogError, CollectError, MultiRunConflict, ScheduleError, StatParseError};
pub use event::{CollectionEvent, EventCount, RawEvent, unique_event_names};
pub use perf::{
    PerfOptions, PerfRunner, RunOutcome, SystemPerfRunner, format_command, perf_command,
    perf_events_arg,
};
pub use schedule::{
    CPU_PMU_COUNTERS, CollectBy, CollectionGroup, Session, available_counters, schedule_events,
    schedule_for_events,
};
pub use stat_output::{
    PERF_SEPARATOR, PerfStatFormat, StatRow, parse_perf_stat_output, read_perf_stat_output,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
