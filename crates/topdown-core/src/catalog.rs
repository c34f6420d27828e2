//! Metric catalog: PMU events, metrics and metric groups for one CPU.
//!
//! The catalog is a JSON document per CPU:
//!
//! ```json
//! {
//!   "events":  { "CPU_CYCLES": { "code": "0x0011" } },
//!   "metrics": { "ipc": { "title": "Instructions Per Cycle", "units": "per cycle",
//!                         "formula": "INST_RETIRED / CPU_CYCLES",
//!                         "events": ["INST_RETIRED", "CPU_CYCLES"] } },
//!   "groups":  { "metrics": { "General": { "title": "General", "metrics": ["ipc"] } } }
//! }
//! ```
//!
//! Everything loaded here is immutable and shared through `Arc` for the rest
//! of the run. Unknown JSON fields are ignored.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::cpu::MAPPING_FILE;
use crate::error::CatalogError;
use crate::event::RawEvent;

/// Minimum similarity for a "did you mean" suggestion.
const CLOSE_MATCH_CUTOFF: f64 = 0.6;

/// A derived metric: a formula over a set of PMU events.
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub title: String,
    pub description: String,
    pub units: String,
    pub formula: String,
    pub events: Vec<Arc<RawEvent>>,
}

impl PartialEq for Metric {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Metric {}

impl Hash for Metric {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A named collection of metrics.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub title: String,
    pub description: String,
    pub metrics: Vec<Arc<Metric>>,
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Group {}

impl Hash for Group {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A metric requested for collection, together with the group it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricInstance {
    pub metric: Arc<Metric>,
    pub group: Arc<Group>,
}

// ---------------------------------------------------------------------------
// JSON shape
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawCatalog {
    #[serde(default)]
    events: BTreeMap<String, RawEventEntry>,
    metrics: BTreeMap<String, RawMetricEntry>,
    groups: RawGroups,
}

#[derive(Deserialize)]
struct RawEventEntry {
    code: String,
}

#[derive(Deserialize)]
struct RawMetricEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    units: String,
    #[serde(default)]
    formula: String,
    #[serde(default)]
    events: Vec<String>,
}

#[derive(Deserialize)]
struct RawGroups {
    #[serde(default)]
    metrics: BTreeMap<String, RawGroupEntry>,
}

#[derive(Deserialize)]
struct RawGroupEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    metrics: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loaded catalog
// ---------------------------------------------------------------------------

/// Events, metrics and groups for one CPU.
#[derive(Debug, Clone, Default)]
pub struct MetricData {
    pub events: BTreeMap<String, Arc<RawEvent>>,
    pub metrics: BTreeMap<String, Arc<Metric>>,
    pub groups: BTreeMap<String, Arc<Group>>,
}

impl MetricData {
    /// Load a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Load the catalog for `cpu` from `<dir>/<cpu>.json`.
    pub fn for_cpu(dir: &Path, cpu: &str) -> Result<Self, CatalogError> {
        Self::load(&dir.join(format!("{cpu}.json")))
    }

    pub fn from_json_str(text: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(text)?;

        let mut events = BTreeMap::new();
        for (name, entry) in raw.events {
            let code = parse_event_code(&entry.code).ok_or_else(|| CatalogError::BadEventCode {
                event: name.clone(),
                code: entry.code.clone(),
            })?;
            events.insert(name.clone(), Arc::new(RawEvent::new(name, code)));
        }

        let mut metrics = BTreeMap::new();
        for (name, entry) in raw.metrics {
            let metric_events = entry
                .events
                .iter()
                .map(|e| {
                    events.get(e).cloned().ok_or_else(|| CatalogError::UnknownEvent {
                        metric: name.clone(),
                        event: e.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            metrics.insert(
                name.clone(),
                Arc::new(Metric {
                    name,
                    title: entry.title,
                    description: entry.description,
                    units: entry.units,
                    formula: entry.formula,
                    events: metric_events,
                }),
            );
        }

        let mut groups = BTreeMap::new();
        for (name, entry) in raw.groups.metrics {
            let group_metrics = entry
                .metrics
                .iter()
                .map(|m| {
                    metrics.get(m).cloned().ok_or_else(|| CatalogError::UnknownMetric {
                        group: name.clone(),
                        metric: m.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            groups.insert(
                name.clone(),
                Arc::new(Group {
                    name,
                    title: entry.title,
                    description: entry.description,
                    metrics: group_metrics,
                }),
            );
        }

        Ok(Self {
            events,
            metrics,
            groups,
        })
    }

    /// Find a group by name, ignoring case, underscores and hyphens.
    pub fn find_group(&self, name: &str) -> Option<&Arc<Group>> {
        let key = to_key(name);
        self.groups.values().find(|g| to_key(&g.name) == key)
    }

    /// Find a metric by name, ignoring case, underscores and hyphens.
    pub fn find_metric(&self, name: &str) -> Option<&Arc<Metric>> {
        let key = to_key(name);
        self.metrics.values().find(|m| to_key(&m.name) == key)
    }

    /// Name of the group closest to `name`, for suggestions on a typo.
    pub fn close_group_match(&self, name: &str) -> Option<&str> {
        closest(name, self.groups.values().map(|g| g.name.as_str()))
    }

    /// Name of the metric closest to `name`, for suggestions on a typo.
    pub fn close_metric_match(&self, name: &str) -> Option<&str> {
        closest(name, self.metrics.values().map(|m| m.name.as_str()))
    }

    /// Every metric of the named group, or `None` for an unknown group.
    pub fn metrics_for_group(&self, name: &str) -> Option<Vec<MetricInstance>> {
        let group = self.find_group(name)?;
        Some(
            group
                .metrics
                .iter()
                .map(|m| MetricInstance {
                    metric: m.clone(),
                    group: group.clone(),
                })
                .collect(),
        )
    }

    /// Groups sorted by name.
    pub fn list_groups(&self) -> Vec<&Arc<Group>> {
        self.groups.values().collect()
    }

    /// The named metric paired with each group that contains it.
    pub fn instances_of_metric(&self, name: &str) -> Vec<MetricInstance> {
        let Some(metric) = self.find_metric(name) else {
            return Vec::new();
        };
        self.groups
            .values()
            .filter(|g| g.metrics.contains(metric))
            .map(|g| MetricInstance {
                metric: metric.clone(),
                group: g.clone(),
            })
            .collect()
    }

    /// Every metric of every group, groups in name order.
    pub fn all_metrics(&self) -> Vec<MetricInstance> {
        self.groups
            .values()
            .flat_map(|g| {
                g.metrics.iter().map(move |m| MetricInstance {
                    metric: m.clone(),
                    group: g.clone(),
                })
            })
            .collect()
    }
}

/// Lookup key for metric and group names: case, underscore and hyphen insensitive.
pub fn to_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// CPUs with a catalog in `dir`: every `<cpu>.json` except the CPU mapping.
pub fn list_cpus(dir: &Path) -> Result<Vec<String>, CatalogError> {
    let io_err = |source: std::io::Error| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut cpus = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let file_name = entry.map_err(io_err)?.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name == MAPPING_FILE || !file_name.to_lowercase().ends_with(".json") {
            continue;
        }
        cpus.push(file_name[..file_name.len() - ".json".len()].to_string());
    }
    cpus.sort();
    Ok(cpus)
}

fn closest<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let key = to_key(name);
    candidates
        .map(|c| (similarity(&key, &to_key(c)), c))
        .filter(|(score, _)| *score >= CLOSE_MATCH_CUTOFF)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c)
}

/// 1.0 for equal strings, 0.0 for nothing in common (edit distance based).
fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f64 / longest as f64
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut cur = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        prev = cur;
    }
    prev[b.len()]
}

fn parse_event_code(code: &str) -> Option<u64> {
    let code = code.trim();
    let hex = code
        .strip_prefix("0x")
        .or_else(|| code.strip_prefix("0X"))
        .unwrap_or(code);
    u64::from_str_radix(hex, 16).ok()
}
