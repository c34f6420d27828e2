//! End-to-end event collection: schedule, run perf per session, parse its
//! output and map every row back to the collection event that requested it.

use crate::catalog::MetricInstance;
use crate::error::{CollectError, MultiRunConflict};
use crate::event::{CollectionEvent, EventCount, unique_event_names};
use crate::perf::{PerfOptions, PerfRunner, RunOutcome, format_command, perf_command};
use crate::schedule::{CollectBy, Session, schedule_for_events};
use crate::stat_output::{StatRow, read_perf_stat_output};

/// Event name whose zero count invalidates a run.
pub const CYCLES_EVENT: &str = "CPU_CYCLES";

/// Counts from one perf run, with the time of its first row (interval mode).
pub type TimedEventCounts = (Option<f64>, Vec<EventCount>);

/// Reject option combinations that cannot be split across several perf runs.
pub fn check_multi_run(sessions: usize, options: &PerfOptions) -> Result<(), MultiRunConflict> {
    if sessions <= 1 {
        return Ok(());
    }
    if !options.pids.is_empty() {
        Err(MultiRunConflict::Pids)
    } else if options.command.is_empty() {
        Err(MultiRunConflict::SystemWide)
    } else if options.interval.is_some() {
        Err(MultiRunConflict::Interval)
    } else {
        Ok(())
    }
}

/// Map parsed rows onto the events passed to perf, by position.
///
/// In interval mode perf repeats the whole event list once per sample, so row
/// `i` belongs to `flat_events[i % flat_events.len()]`. Each row's event name
/// must match the name perf was given for that position.
pub fn reconcile(
    flat_events: &[CollectionEvent],
    rows: Vec<StatRow>,
    use_event_names: bool,
) -> Result<Vec<EventCount>, CollectError> {
    if flat_events.is_empty() {
        return match rows.into_iter().next() {
            None => Ok(Vec::new()),
            Some(row) => Err(CollectError::EventMismatch {
                index: 0,
                expected: String::new(),
                found: row.event,
            }),
        };
    }

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            let event = &flat_events[index % flat_events.len()];
            let expected = event.perf_name(use_event_names);
            if row.event != expected {
                return Err(CollectError::EventMismatch {
                    index,
                    expected,
                    found: row.event,
                });
            }
            Ok(EventCount {
                event: event.clone(),
                value: row.value,
                time: row.time,
            })
        })
        .collect()
}

/// Check a session's counts for conditions that make the run unusable.
///
/// A zero CPU_CYCLES count fails first. Otherwise every event without a value
/// is reported, and so is every event whose position perf wrote no row for:
/// all of them for empty output, the tail of the event list when the output
/// stops part way through (or part way through an interval sample).
pub fn validate_counts(
    flat_events: &[CollectionEvent],
    counts: &[EventCount],
) -> Result<(), CollectError> {
    if counts
        .iter()
        .any(|c| c.event.event.name == CYCLES_EVENT && c.value == Some(0.0))
    {
        return Err(CollectError::ZeroCycles);
    }

    let filled = counts.len().checked_rem(flat_events.len()).unwrap_or(0);
    let without_row: &[CollectionEvent] = if counts.is_empty() {
        flat_events
    } else if filled != 0 {
        &flat_events[filled..]
    } else {
        &[]
    };

    let mut uncounted: Vec<String> = Vec::new();
    let missing = counts
        .iter()
        .filter(|c| c.value.is_none())
        .map(|c| &c.event)
        .chain(without_row);
    for event in missing {
        if !uncounted.contains(&event.event.name) {
            uncounted.push(event.event.name.clone());
        }
    }

    if uncounted.is_empty() {
        Ok(())
    } else {
        Err(CollectError::UncountedEvents(uncounted))
    }
}

/// Run perf for one scheduled session and return its reconciled counts.
pub fn run_session<R: PerfRunner>(
    session: &Session,
    options: &PerfOptions,
    runner: &mut R,
) -> Result<TimedEventCounts, CollectError> {
    // Duplicate events are passed to perf as-is: perf copes with them, and
    // it keeps output rows aligned with `flat_events`.
    let flat_events: Vec<CollectionEvent> = session.iter().flatten().cloned().collect();
    if options.collect_by == CollectBy::None {
        debug_assert!(session.iter().all(|g| g.len() == 1));
    }

    let command = perf_command(session, options)?;
    let shown = format_command(&command);
    log::info!("Running \"{shown}\"");
    let unique: Vec<&str> = unique_event_names(&flat_events).into_iter().collect();
    log::debug!("Unique events: {}", unique.join(","));

    match runner.run(&command, &options.perf_output)? {
        RunOutcome::Interrupted => log::info!("Received interrupt. Analysing data."),
        RunOutcome::Exited(status) if !status.success() => {
            return Err(CollectError::ToolFailed {
                command: shown,
                status,
            });
        }
        RunOutcome::Exited(_) => {}
    }

    let rows = read_perf_stat_output(&options.perf_output, options.stat_format())?;
    let counts = reconcile(&flat_events, rows, options.use_event_names)?;
    validate_counts(&flat_events, &counts)?;

    let time = counts.first().and_then(|c| c.time);
    Ok((time, counts))
}

/// Collect the events needed by `instances`, running perf as many times as
/// the counter limit requires.
///
/// Scheduling and option conflicts are reported before perf is started.
pub fn collect_events<R: PerfRunner>(
    instances: &[MetricInstance],
    options: &PerfOptions,
    runner: &mut R,
) -> Result<Vec<TimedEventCounts>, CollectError> {
    let schedule = schedule_for_events(instances, options.collect_by, options.max_events)?;
    check_multi_run(schedule.len(), options)?;

    if options.command.is_empty() && options.pids.is_empty() {
        println!("Starting system-wide profiling. Hit Ctrl-C to stop. (See --help for usage information.)");
    } else if !options.pids.is_empty() {
        println!("Monitoring {}. Hit Ctrl-C to stop.", options.pids_display_string());
    }

    schedule
        .iter()
        .map(|session| run_session(session, options, runner))
        .collect()
}
