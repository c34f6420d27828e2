//! Event scheduling under the PMU counter limit.
//!
//! Metrics are turned into [`CollectionEvent`]s, partitioned into collection
//! groups according to [`CollectBy`], and the groups are packed into perf
//! runs ("sessions") so that no run needs more counters than are available.
//!
//! The packer is a first-fit greedy pass, not an optimal bin packer:
//! - it takes groups from the back of the list until the next one does not fit,
//! - groups sharing PMU events are not merged to save counters,
//! - fixed-function counters (e.g. CPU_CYCLES) are not accounted for.

use std::collections::HashSet;
use std::sync::Arc;

use crate::catalog::{Group, Metric, MetricInstance};
use crate::error::ScheduleError;
use crate::event::{CollectionEvent, unique_event_names};

/// Number of general purpose PMU counters assumed to be available.
pub const CPU_PMU_COUNTERS: usize = 6;

/// Events that must be counted together. Never split across perf runs.
pub type CollectionGroup = Vec<CollectionEvent>;

/// Collection groups assigned to one perf run.
pub type Session = Vec<CollectionGroup>;

/// How events are batched when they do not all fit in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CollectBy {
    /// Every event is scheduled independently.
    None,
    /// Events of one metric are always counted together.
    #[default]
    Metric,
    /// Events of one metric group are always counted together.
    Group,
}

impl std::fmt::Display for CollectBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Metric => write!(f, "metric"),
            Self::Group => write!(f, "group"),
        }
    }
}

impl std::str::FromStr for CollectBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "metric" => Ok(Self::Metric),
            "group" => Ok(Self::Group),
            _ => Err(format!(
                "invalid collect-by mode '{s}' (expected none, metric or group)"
            )),
        }
    }
}

/// Counters available to the scheduler: the requested maximum, clamped to the
/// hardware ceiling (and to at least one counter).
pub fn available_counters(max_events: Option<usize>) -> usize {
    max_events
        .map_or(CPU_PMU_COUNTERS, |n| n.min(CPU_PMU_COUNTERS))
        .max(1)
}

fn unique_len(group: &[CollectionEvent]) -> usize {
    unique_event_names(group).len()
}

/// Pack collection groups into runs of at most `max_events` distinct events.
///
/// Groups are consumed from the back of `groups`. Every group must itself fit
/// in `max_events`; a group that does not is still given a run of its own so
/// the schedule always terminates and never drops a group.
///
/// Returned groups may hold more than `max_events` collection events, since
/// several collection events can refer to the same PMU event.
pub fn schedule_events(mut groups: Vec<CollectionGroup>, max_events: usize) -> Vec<Session> {
    let mut schedule = Vec::new();

    while !groups.is_empty() {
        let mut session: Session = Vec::new();
        let mut num_events = 0;

        while let Some(next) = groups.last() {
            let len = unique_len(next);
            if num_events + len > max_events && !session.is_empty() {
                break;
            }
            if len > max_events {
                log::warn!(
                    "collection group needs {len} counters, only {max_events} available"
                );
            }
            num_events += len;
            if let Some(group) = groups.pop() {
                session.push(group);
            }
        }

        schedule.push(session);
    }

    schedule
}

/// Distinct collection events for `instances`, qualified per `collect_by`.
///
/// Order follows first appearance in `instances`.
pub fn collection_events(instances: &[MetricInstance], collect_by: CollectBy) -> Vec<CollectionEvent> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for mi in instances {
        let group = (collect_by == CollectBy::Group).then(|| mi.group.clone());
        let metric = (collect_by != CollectBy::None).then(|| mi.metric.clone());
        for event in &mi.metric.events {
            let ce = CollectionEvent::new(event.clone(), group.clone(), metric.clone());
            if seen.insert(ce.clone()) {
                out.push(ce);
            }
        }
    }

    out
}

/// Partition collection events into the groups that must be counted together.
///
/// Fails if a single metric (or group) needs more than `available` counters.
pub fn collection_groups(
    events: &[CollectionEvent],
    collect_by: CollectBy,
    available: usize,
) -> Result<Vec<CollectionGroup>, ScheduleError> {
    match collect_by {
        CollectBy::None => Ok(events.iter().map(|e| vec![e.clone()]).collect()),
        CollectBy::Metric => {
            let keyed = partition_by(events, |e| e.metric.clone());
            keyed
                .into_iter()
                .map(|(metric, group_events)| -> Result<CollectionGroup, ScheduleError> {
                    check_fits(&group_events, available, |names| ScheduleError::Metric {
                        metric: metric_name(metric.as_ref()),
                        events: names,
                        available,
                    })?;
                    Ok(group_events)
                })
                .collect()
        }
        CollectBy::Group => {
            let keyed = partition_by(events, |e| e.group.clone());
            keyed
                .into_iter()
                .map(|(group, group_events)| -> Result<CollectionGroup, ScheduleError> {
                    check_fits(&group_events, available, |names| ScheduleError::Group {
                        group: group_name(group.as_ref()),
                        events: names,
                        available,
                    })?;
                    Ok(group_events)
                })
                .collect()
        }
    }
}

fn metric_name(metric: Option<&Arc<Metric>>) -> String {
    metric.map(|m| m.name.clone()).unwrap_or_default()
}

fn group_name(group: Option<&Arc<Group>>) -> String {
    group.map(|g| g.title.clone()).unwrap_or_default()
}

/// Group `events` by `key`, keeping first-seen key order.
fn partition_by<K, F>(events: &[CollectionEvent], key: F) -> Vec<(K, CollectionGroup)>
where
    K: PartialEq,
    F: Fn(&CollectionEvent) -> K,
{
    let mut out: Vec<(K, CollectionGroup)> = Vec::new();
    for e in events {
        let k = key(e);
        match out.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, group)) => group.push(e.clone()),
            None => out.push((k, vec![e.clone()])),
        }
    }
    out
}

fn check_fits<F>(events: &[CollectionEvent], available: usize, err: F) -> Result<(), ScheduleError>
where
    F: FnOnce(Vec<String>) -> ScheduleError,
{
    let unique = unique_event_names(events);
    if unique.len() > available {
        return Err(err(unique.into_iter().map(str::to_string).collect()));
    }
    Ok(())
}

/// Build the run schedule for a set of metric instances.
pub fn schedule_for_events(
    instances: &[MetricInstance],
    collect_by: CollectBy,
    max_events: Option<usize>,
) -> Result<Vec<Session>, ScheduleError> {
    let available = available_counters(max_events);
    let events = collection_events(instances, collect_by);
    let groups = collection_groups(&events, collect_by, available)?;

    let mut logged = HashSet::new();
    log::info!("Collecting derived metrics:");
    for mi in instances {
        if logged.insert(mi.metric.name.as_str()) {
            log::info!("    {} = {}", mi.metric.title, mi.metric.formula);
        }
    }

    Ok(schedule_events(groups, available))
}
