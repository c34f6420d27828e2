//! Building and running `perf stat` invocations.
//!
//! Each scheduled session becomes one `perf stat` command line. Launching the
//! command goes through the [`PerfRunner`] trait so tests can substitute a
//! runner that writes canned output instead of starting perf.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CollectError;
use crate::schedule::{CollectBy, Session};
use crate::stat_output::{PERF_SEPARATOR, PerfStatFormat};

/// Options controlling how perf is invoked.
#[derive(Debug, Clone)]
pub struct PerfOptions {
    /// Command to profile. Empty means system-wide (or PID) monitoring.
    pub command: Vec<String>,
    pub all_cpus: bool,
    pub pids: Vec<u32>,
    /// Maximum simultaneous events requested by the user.
    pub max_events: Option<usize>,
    pub collect_by: CollectBy,
    /// Pass symbolic event names instead of raw `r<hex>` codes.
    pub use_event_names: bool,
    /// Extra perf arguments, split with shell word rules.
    pub perf_args: String,
    pub perf_output: PathBuf,
    /// Interval in milliseconds (`perf stat -I`).
    pub interval: Option<u64>,
    /// perf executable.
    pub perf: String,
}

impl Default for PerfOptions {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            all_cpus: false,
            pids: Vec::new(),
            max_events: None,
            collect_by: CollectBy::Metric,
            use_event_names: false,
            perf_args: String::new(),
            perf_output: PathBuf::from("perf.stat.txt"),
            interval: None,
            perf: "perf".to_string(),
        }
    }
}

impl PerfOptions {
    /// Comma-separated list of PIDs.
    pub fn pids_string(&self) -> String {
        self.pids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Comma-separated list of PIDs, prefixed with `PID` or `PIDs`.
    pub fn pids_display_string(&self) -> String {
        let prefix = if self.pids.len() == 1 { "PID" } else { "PIDs" };
        format!("{prefix} {}", self.pids_string())
    }

    /// Output line shape perf will produce with these options.
    pub fn stat_format(&self) -> PerfStatFormat {
        if self.interval.is_some() {
            PerfStatFormat::Interval
        } else {
            PerfStatFormat::NonInterval
        }
    }
}

/// The `-e` argument for a session.
///
/// Without grouping this is a flat list (`e1,e2,e3`). Otherwise each
/// collection group is wrapped in braces (`{e1,e2},{e3}`) so perf schedules
/// the group's events together. Empty groups are left out.
pub fn perf_events_arg(session: &Session, collect_by: CollectBy, use_event_names: bool) -> String {
    let name = |group: &[crate::event::CollectionEvent]| {
        group
            .iter()
            .map(|e| e.perf_name(use_event_names))
            .collect::<Vec<_>>()
            .join(",")
    };

    match collect_by {
        CollectBy::None => session
            .iter()
            .map(|g| name(g.as_slice()))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        CollectBy::Metric | CollectBy::Group => session
            .iter()
            .filter(|g| !g.is_empty())
            .map(|g| format!("{{{}}}", name(g.as_slice())))
            .collect::<Vec<_>>()
            .join(","),
    }
}

/// Full perf command line for one session.
pub fn perf_command(session: &Session, options: &PerfOptions) -> Result<Vec<String>, CollectError> {
    let mut cmd = vec![
        options.perf.clone(),
        "stat".to_string(),
        "-e".to_string(),
        perf_events_arg(session, options.collect_by, options.use_event_names),
        "-o".to_string(),
        options.perf_output.display().to_string(),
        "-x".to_string(),
        PERF_SEPARATOR.to_string(),
    ];

    if options.all_cpus {
        cmd.push("-a".to_string());
    }
    if !options.pids.is_empty() {
        cmd.push("-p".to_string());
        cmd.push(options.pids_string());
    }
    if let Some(interval) = options.interval {
        cmd.push("-I".to_string());
        cmd.push(interval.to_string());
    }
    if !options.perf_args.trim().is_empty() {
        let extra = shlex::split(&options.perf_args)
            .ok_or_else(|| CollectError::PerfArgs(options.perf_args.clone()))?;
        cmd.extend(extra);
    }
    cmd.extend(options.command.iter().cloned());

    Ok(cmd)
}

/// Format a command line for display, quoting arguments where needed.
pub fn format_command(cmd: &[String]) -> String {
    shlex::try_join(cmd.iter().map(String::as_str)).unwrap_or_else(|_| cmd.join(" "))
}

/// How a perf invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// perf exited on its own.
    Exited(ExitStatus),
    /// The run was cut short by an interrupt (Ctrl-C).
    Interrupted,
}

/// Runs one perf command to completion.
///
/// `output` is the file the command writes its counts to; implementations
/// that do not launch perf can write canned data there.
pub trait PerfRunner {
    fn run(&mut self, command: &[String], output: &Path) -> std::io::Result<RunOutcome>;
}

/// Launches perf as a child process and waits for it.
///
/// The `interrupted` flag is expected to be set by a SIGINT handler (see the
/// `ctrlc` crate). perf shares the terminal's process group, so it receives
/// the same signal and exits after writing what it has counted.
#[derive(Debug, Clone, Default)]
pub struct SystemPerfRunner {
    interrupted: Arc<AtomicBool>,
}

impl SystemPerfRunner {
    pub fn new(interrupted: Arc<AtomicBool>) -> Self {
        Self { interrupted }
    }

    /// Flag to set from a signal handler.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }
}

impl PerfRunner for SystemPerfRunner {
    fn run(&mut self, command: &[String], _output: &Path) -> std::io::Result<RunOutcome> {
        let Some((program, args)) = command.split_first() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty perf command",
            ));
        };

        self.interrupted.store(false, Ordering::SeqCst);
        let status = Command::new(program).args(args).status()?;

        // The handler thread may not have run yet when perf has already died
        // from the same SIGINT, so the exit signal counts too.
        if self.interrupted.swap(false, Ordering::SeqCst) || killed_by_sigint(status) {
            Ok(RunOutcome::Interrupted)
        } else {
            Ok(RunOutcome::Exited(status))
        }
    }
}

#[cfg(unix)]
fn killed_by_sigint(status: ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    const SIGINT: i32 = 2;
    status.signal() == Some(SIGINT)
}

#[cfg(not(unix))]
fn killed_by_sigint(_status: ExitStatus) -> bool {
    false
}
