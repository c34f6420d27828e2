//! Event identities used while scheduling and reconciling perf runs.
//!
//! A [`RawEvent`] is a PMU event from the catalog. A [`CollectionEvent`] is a
//! raw event qualified by the group or metric that asked for it, so the same
//! PMU event can be collected (and reported) once per requester. An
//! [`EventCount`] is the outcome of measuring one collection event.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::catalog::{Group, Metric};

/// A PMU event: name and numeric event code.
///
/// Identity is by name; two events with the same name are the same event.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub name: String,
    pub code: u64,
}

impl RawEvent {
    pub fn new(name: impl Into<String>, code: u64) -> Self {
        Self {
            name: name.into(),
            code,
        }
    }
}

impl PartialEq for RawEvent {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for RawEvent {}

impl Hash for RawEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A raw event annotated with the group or metric that requested it.
///
/// At most one of `group`/`metric` is normally populated, depending on the
/// active [`CollectBy`](crate::schedule::CollectBy) mode. Equality and hashing
/// use the whole `(event, group, metric)` triple, so the value can be used
/// directly as a set key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionEvent {
    pub event: Arc<RawEvent>,
    pub group: Option<Arc<Group>>,
    pub metric: Option<Arc<Metric>>,
}

impl CollectionEvent {
    pub fn new(
        event: Arc<RawEvent>,
        group: Option<Arc<Group>>,
        metric: Option<Arc<Metric>>,
    ) -> Self {
        Self {
            event,
            group,
            metric,
        }
    }

    /// Dotted `group.metric.event` name, omitting absent qualifiers.
    ///
    /// Hyphens in group names become underscores so the name stays a valid
    /// formula identifier.
    pub fn qualified_name(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(3);
        if let Some(group) = &self.group {
            parts.push(group.name.replace('-', "_"));
        }
        if let Some(metric) = &self.metric {
            parts.push(metric.name.clone());
        }
        parts.push(self.event.name.clone());
        parts.join(".")
    }

    /// The event as it is passed to (and echoed back by) perf: either the
    /// symbolic name or the raw `r<hex>` encoding.
    pub fn perf_name(&self, use_event_names: bool) -> String {
        if use_event_names {
            self.event.name.clone()
        } else {
            format!("r{:x}", self.event.code)
        }
    }
}

impl std::fmt::Display for CollectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:x})", self.qualified_name(), self.event.code)
    }
}

impl Serialize for CollectionEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("CollectionEvent", 5)?;
        s.serialize_field("qualified_name", &self.qualified_name())?;
        s.serialize_field("event", &self.event.name)?;
        s.serialize_field("code", &format!("0x{:x}", self.event.code))?;
        s.serialize_field("group", &self.group.as_ref().map(|g| g.name.as_str()))?;
        s.serialize_field("metric", &self.metric.as_ref().map(|m| m.name.as_str()))?;
        s.end()
    }
}

/// Measured value of one collection event in one perf run.
///
/// `value` is `None` when perf reported the event as not counted or not
/// supported; a real zero count is `Some(0.0)`. `time` is only present for
/// interval collection.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EventCount {
    pub event: CollectionEvent,
    pub value: Option<f64>,
    pub time: Option<f64>,
}

/// Distinct PMU event names across a set of collection events.
///
/// This is the number of counters the events actually need: a group can hold
/// the same PMU event several times under different metrics.
pub fn unique_event_names<'a, I>(events: I) -> BTreeSet<&'a str>
where
    I: IntoIterator<Item = &'a CollectionEvent>,
{
    events.into_iter().map(|e| e.event.name.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn metric(name: &str, events: &[Arc<RawEvent>]) -> Arc<Metric> {
        Arc::new(Metric {
            name: name.to_string(),
            title: name.to_string(),
            description: String::new(),
            units: "percent".to_string(),
            formula: String::new(),
            events: events.to_vec(),
        })
    }

    fn group(name: &str) -> Arc<Group> {
        Arc::new(Group {
            name: name.to_string(),
            title: name.to_string(),
            description: String::new(),
            metrics: Vec::new(),
        })
    }

    #[test]
    fn test_qualified_name_event_only() {
        let e = CollectionEvent::new(Arc::new(RawEvent::new("CPU_CYCLES", 0x11)), None, None);
        assert_eq!(e.qualified_name(), "CPU_CYCLES");
    }

    #[test]
    fn test_qualified_name_with_group_replaces_hyphens() {
        let e = CollectionEvent::new(
            Arc::new(RawEvent::new("INST_RETIRED", 0x08)),
            Some(group("Cycle-Accounting")),
            None,
        );
        assert_eq!(e.qualified_name(), "Cycle_Accounting.INST_RETIRED");
    }

    #[test]
    fn test_qualified_name_with_metric() {
        let cycles = Arc::new(RawEvent::new("CPU_CYCLES", 0x11));
        let e = CollectionEvent::new(cycles.clone(), None, Some(metric("ipc", &[cycles])));
        assert_eq!(e.qualified_name(), "ipc.CPU_CYCLES");
    }

    #[test]
    fn test_perf_name_modes() {
        let e = CollectionEvent::new(Arc::new(RawEvent::new("BR_PRED", 0x12)), None, None);
        assert_eq!(e.perf_name(true), "BR_PRED");
        assert_eq!(e.perf_name(false), "r12");
    }

    #[test]
    fn test_display_includes_code() {
        let e = CollectionEvent::new(Arc::new(RawEvent::new("L1D_CACHE", 0x4)), None, None);
        assert_eq!(e.to_string(), "L1D_CACHE (0x4)");
    }

    #[test]
    fn test_equality_uses_value_not_pointer() {
        let a = CollectionEvent::new(Arc::new(RawEvent::new("CPU_CYCLES", 0x11)), None, None);
        let b = CollectionEvent::new(Arc::new(RawEvent::new("CPU_CYCLES", 0x11)), None, None);
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_different_metric_is_different_identity() {
        let cycles = Arc::new(RawEvent::new("CPU_CYCLES", 0x11));
        let a = CollectionEvent::new(cycles.clone(), None, Some(metric("ipc", &[cycles.clone()])));
        let b = CollectionEvent::new(cycles.clone(), None, Some(metric("cpi", &[cycles])));
        assert_ne!(a, b);
    }

    #[test]
    fn test_unique_event_names_dedups_across_metrics() {
        let cycles = Arc::new(RawEvent::new("CPU_CYCLES", 0x11));
        let insts = Arc::new(RawEvent::new("INST_RETIRED", 0x08));
        let ipc = metric("ipc", &[cycles.clone(), insts.clone()]);
        let cpi = metric("cpi", &[cycles.clone(), insts.clone()]);
        let events = vec![
            CollectionEvent::new(cycles.clone(), None, Some(ipc.clone())),
            CollectionEvent::new(insts.clone(), None, Some(ipc)),
            CollectionEvent::new(cycles, None, Some(cpi.clone())),
            CollectionEvent::new(insts, None, Some(cpi)),
        ];
        let names = unique_event_names(&events);
        assert_eq!(names.len(), 2);
        assert!(names.contains("CPU_CYCLES"));
        assert!(names.contains("INST_RETIRED"));
    }
}
