//! Error types for catalog loading, scheduling and event collection.

use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Failure to load a metric catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("metric {metric} references unknown event {event}")]
    UnknownEvent { metric: String, event: String },

    #[error("group {group} references unknown metric {metric}")]
    UnknownMetric { group: String, metric: String },

    #[error("event {event} has invalid code {code:?}")]
    BadEventCode { event: String, code: String },
}

/// A single group or metric needs more counters than are available.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Could not schedule {} for group {group}: {available} counters available", events.join(", "))]
    Group {
        group: String,
        events: Vec<String>,
        available: usize,
    },

    #[error("Could not schedule {} for metric {metric}: {available} counters available", events.join(", "))]
    Metric {
        metric: String,
        events: Vec<String>,
        available: usize,
    },
}

impl ScheduleError {
    /// Distinct event names that did not fit.
    pub fn events(&self) -> &[String] {
        match self {
            Self::Group { events, .. } | Self::Metric { events, .. } => events,
        }
    }

    pub fn available(&self) -> usize {
        match self {
            Self::Group { available, .. } | Self::Metric { available, .. } => *available,
        }
    }
}

/// Collection modes that cannot be split over several perf runs.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiRunConflict {
    #[error("Can't do system-wide profiling with multiple runs. Remove --max-events.")]
    SystemWide,

    #[error("Can't monitor PID(s) with multiple runs. Remove --max-events.")]
    Pids,

    #[error("Can't collect interval data with multiple runs. Remove --max-events.")]
    Interval,
}

/// A line of perf stat output that does not have the expected shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line_no}: {reason}: {line:?}")]
pub struct StatParseError {
    pub line_no: usize,
    pub line: String,
    pub reason: String,
}

/// Errors raised while collecting events with perf.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    MultiRun(#[from] MultiRunConflict),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid perf output: {0}")]
    Parse(#[from] StatParseError),

    #[error("could not split perf arguments {0:?}")]
    PerfArgs(String),

    #[error("\"{command}\" finished with {status}")]
    ToolFailed { command: String, status: ExitStatus },

    #[error("perf output row {index} is {found}, expected {expected}")]
    EventMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("CPU_CYCLES counted zero cycles")]
    ZeroCycles,

    #[error("The following events were not counted: {}", .0.join(", "))]
    UncountedEvents(Vec<String>),
}
