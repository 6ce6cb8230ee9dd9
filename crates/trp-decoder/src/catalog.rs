//! Per-name aggregation of decoded samples and events

use std::cmp::Ordering;
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use tracing::warn;

use crate::dictionary::DeclarationSet;
use crate::models::{
    CatalogDefaults, Catalogs, DecodedEvent, DecodedSample, EventCatalogEntry,
    MetricCatalogEntry, MetricStats, NeighborMetric, RunSidebar, SidebarGroup, ValueKind,
};
use crate::utils::time::parse_timestamp;

const TAG_KEYWORDS: [&str; 11] = [
    "RSRP", "SINR", "MOS", "VOLTE", "IMS", "RTP", "RSRQ", "BLER", "RSCP", "ECNO", "CALL",
];
const NUMERIC_DTYPE_HINTS: [&str; 7] = ["int", "float", "double", "num", "decimal", "long", "short"];
const STRING_DTYPE_HINTS: [&str; 4] = ["string", "text", "bool", "enum"];
const UNKNOWN_EVENT: &str = "UnknownEvent";
pub const ALL_KPIS_GROUP: &str = "All KPIs";
pub const MAX_GROUP_ITEMS: usize = 2000;

/// Order two timestamps, as instants when both parse and as text otherwise
pub fn compare_times(a: &str, b: &str) -> Ordering {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

fn widen(range: &mut (Option<String>, Option<String>), time: &str) {
    if time.is_empty() {
        return;
    }
    let (first, last) = range;
    if first
        .as_deref()
        .is_none_or(|f| compare_times(time, f) == Ordering::Less)
    {
        *first = Some(time.to_string());
    }
    if last
        .as_deref()
        .is_none_or(|l| compare_times(time, l) == Ordering::Greater)
    {
        *last = Some(time.to_string());
    }
}

pub fn derive_tags(name: &str) -> Vec<String> {
    let upper = name.to_uppercase();
    TAG_KEYWORDS
        .iter()
        .filter(|kw| upper.contains(*kw))
        .map(|kw| kw.to_string())
        .collect()
}

pub fn infer_value_kind(dtype: &str, numeric_count: usize, string_count: usize) -> ValueKind {
    let dtype = dtype.to_lowercase();
    if NUMERIC_DTYPE_HINTS.iter().any(|h| dtype.contains(h)) {
        ValueKind::Numeric
    } else if STRING_DTYPE_HINTS.iter().any(|h| dtype.contains(h)) {
        ValueKind::String
    } else if numeric_count >= string_count {
        ValueKind::Numeric
    } else {
        ValueKind::String
    }
}

#[derive(Debug)]
struct MetricAccumulator {
    metric_id: u64,
    name: String,
    dtype: String,
    lookup: Option<String>,
    numeric_count: usize,
    string_count: usize,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    times: (Option<String>, Option<String>),
}

impl MetricAccumulator {
    fn new(metric_id: u64, name: &str, dtype: &str, lookup: Option<&String>) -> Self {
        Self {
            metric_id,
            name: name.to_string(),
            dtype: if dtype.is_empty() { "unknown".to_string() } else { dtype.to_string() },
            lookup: lookup.cloned(),
            numeric_count: 0,
            string_count: 0,
            sum: 0.0,
            min: None,
            max: None,
            times: (None, None),
        }
    }

    fn add(&mut self, sample: &DecodedSample) {
        if let Some(v) = sample.value_num.filter(|v| v.is_finite()) {
            self.numeric_count += 1;
            self.sum += v;
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        } else if sample.value_str.is_some() {
            self.string_count += 1;
        } else {
            return;
        }
        widen(&mut self.times, &sample.time);
    }

    fn finish(self) -> MetricCatalogEntry {
        let avg = (self.numeric_count > 0).then(|| self.sum / self.numeric_count as f64);
        MetricCatalogEntry {
            metric_id: self.metric_id,
            value_kind: infer_value_kind(&self.dtype, self.numeric_count, self.string_count),
            path_segments: self.name.split('.').map(str::to_string).collect(),
            tags: derive_tags(&self.name),
            stats: MetricStats {
                sample_count: self.numeric_count + self.string_count,
                min: self.min,
                max: self.max,
                avg,
                first_time: self.times.0,
                last_time: self.times.1,
            },
            name: self.name,
            dtype: self.dtype,
            lookup: self.lookup,
        }
    }
}

#[derive(Debug)]
struct EventAccumulator {
    metric_id: Option<u64>,
    count: usize,
    times: (Option<String>, Option<String>),
    param_ids: BTreeSet<u64>,
}

fn by_name_case_insensitive(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Build metric and event catalogs.
///
/// Declared metrics without samples are listed with a zero sample count.
pub fn build_catalogs(
    samples: &[DecodedSample],
    events: &[DecodedEvent],
    declarations: &DeclarationSet,
) -> Catalogs {
    let mut metrics: HashMap<&str, MetricAccumulator> = HashMap::new();
    for sample in samples {
        if sample.name.is_empty() {
            continue;
        }
        metrics
            .entry(sample.name.as_str())
            .or_insert_with(|| {
                MetricAccumulator::new(
                    sample.metric_id,
                    &sample.name,
                    &sample.dtype,
                    sample.lookup.as_ref(),
                )
            })
            .add(sample);
    }
    for declaration in declarations.iter() {
        if declaration.name.is_empty() {
            continue;
        }
        metrics
            .entry(declaration.name.as_str())
            .or_insert_with(|| {
                MetricAccumulator::new(
                    declaration.metric_id,
                    &declaration.name,
                    &declaration.dtype,
                    declaration.lookup_table_name.as_ref(),
                )
            });
    }

    let mut metric_entries: Vec<_> = metrics.into_values().map(MetricAccumulator::finish).collect();
    metric_entries.sort_by(|a, b| by_name_case_insensitive(&a.name, &b.name));

    let mut by_event: HashMap<&str, EventAccumulator> = HashMap::new();
    for event in events {
        let name = if event.event_name.is_empty() {
            UNKNOWN_EVENT
        } else {
            event.event_name.as_str()
        };
        let acc = by_event.entry(name).or_insert_with(|| EventAccumulator {
            metric_id: event.metric_id,
            count: 0,
            times: (None, None),
            param_ids: BTreeSet::new(),
        });
        acc.count += 1;
        widen(&mut acc.times, &event.time);
        acc.param_ids
            .extend(event.params.iter().map(|p| p.param_id));
    }

    let mut event_entries: Vec<_> = by_event
        .into_iter()
        .map(|(name, acc)| EventCatalogEntry {
            event_name: name.to_string(),
            metric_id: acc.metric_id,
            count: acc.count,
            first_seen_time: acc.times.0,
            last_seen_time: acc.times.1,
            param_ids: acc.param_ids.iter().map(u64::to_string).collect(),
        })
        .collect();
    event_entries.sort_by(|a, b| by_name_case_insensitive(&a.event_name, &b.event_name));

    Catalogs {
        metrics: metric_entries,
        events: event_entries,
    }
}

fn neighbor_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            RegexBuilder::new(r"^Radio\.Lte\.Neighbor\[(\d+)\]\.(Pci|Rsrp|Rsrq|Earfcn|Frequency)$")
                .case_insensitive(true)
                .build()
                .map_err(|e| warn!("neighbor pattern failed to compile: {}", e))
                .ok()
        })
        .as_ref()
}

/// Group `Radio.Lte.Neighbor[N].<field>` samples by exact name.
///
/// Ordered by neighbour index, then field and name case-insensitively.
pub fn extract_neighbor_metrics(samples: &[DecodedSample]) -> Vec<NeighborMetric> {
    let Some(pattern) = neighbor_pattern() else {
        return Vec::new();
    };

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for sample in samples {
        let name = sample.name.trim();
        if pattern.is_match(name) {
            *counts.entry(name).or_default() += 1;
        }
    }

    let mut neighbors: Vec<NeighborMetric> = counts
        .into_iter()
        .filter_map(|(name, sample_count)| {
            let caps = pattern.captures(name)?;
            Some(NeighborMetric {
                name: name.to_string(),
                neighbor_index: caps[1].parse().ok()?,
                field: caps[2].to_string(),
                sample_count,
            })
        })
        .collect();
    neighbors.sort_by(|a, b| {
        a.neighbor_index
            .cmp(&b.neighbor_index)
            .then_with(|| a.field.to_lowercase().cmp(&b.field.to_lowercase()))
            .then_with(|| by_name_case_insensitive(&a.name, &b.name))
    });
    neighbors
}

/// First metric whose name contains each keyword, falling back to the first metric
pub fn catalog_defaults(metrics: &[MetricCatalogEntry]) -> CatalogDefaults {
    let find = |keyword: &str| {
        metrics
            .iter()
            .find(|m| m.name.to_lowercase().contains(keyword))
            .or_else(|| metrics.first())
            .map(|m| m.name.clone())
    };
    CatalogDefaults {
        rsrp_metric_name: find("rsrp"),
        sinr_metric_name: find("sinr"),
        mos_metric_name: find("mos"),
    }
}

pub fn sidebar_groups(metrics: &[MetricCatalogEntry]) -> Vec<SidebarGroup> {
    vec![SidebarGroup {
        title: ALL_KPIS_GROUP.to_string(),
        items: metrics
            .iter()
            .take(MAX_GROUP_ITEMS)
            .map(|m| m.name.clone())
            .collect(),
    }]
}

pub fn build_sidebar(catalogs: &Catalogs, samples: &[DecodedSample]) -> RunSidebar {
    RunSidebar {
        groups: sidebar_groups(&catalogs.metrics),
        neighbors: extract_neighbor_metrics(samples),
        defaults: catalog_defaults(&catalogs.metrics),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventParam, ParamType, ParamValue};

    fn sample(name: &str, time: &str, num: Option<f64>, text: Option<&str>) -> DecodedSample {
        DecodedSample {
            time: time.to_string(),
            metric_id: 1,
            name: name.to_string(),
            value_num: num,
            value_str: text.map(str::to_string),
            dtype: "unknown".to_string(),
            lookup: None,
        }
    }

    #[test]
    fn test_numeric_and_string_aggregation() {
        let samples = vec![
            sample("Radio.Lte.ServingCell.Rsrp", "2024-12-07T00:00:01.000Z", Some(-95.0), None),
            sample("Radio.Lte.ServingCell.Rsrp", "2024-12-07T00:00:00.000Z", Some(-90.0), None),
            sample("VoLTE.Call.State", "2024-12-07T00:00:02.000Z", None, Some("Connected")),
        ];
        let catalogs = build_catalogs(&samples, &[], &DeclarationSet::default());
        assert_eq!(catalogs.metrics.len(), 2);

        let rsrp = &catalogs.metrics[0];
        assert_eq!(rsrp.name, "Radio.Lte.ServingCell.Rsrp");
        assert_eq!(rsrp.stats.sample_count, 2);
        assert_eq!(rsrp.stats.avg, Some(-92.5));
        assert_eq!(rsrp.stats.min, Some(-95.0));
        assert_eq!(rsrp.stats.max, Some(-90.0));
        assert_eq!(rsrp.stats.first_time.as_deref(), Some("2024-12-07T00:00:00.000Z"));
        assert_eq!(rsrp.value_kind, ValueKind::Numeric);
        assert_eq!(rsrp.tags, vec!["RSRP"]);
        assert_eq!(rsrp.path_segments, vec!["Radio", "Lte", "ServingCell", "Rsrp"]);

        let state = &catalogs.metrics[1];
        assert_eq!(state.stats.sample_count, 1);
        assert_eq!(state.stats.avg, None);
        assert_eq!(state.value_kind, ValueKind::String);
        assert_eq!(state.tags, vec!["VOLTE", "CALL"]);
    }

    #[test]
    fn test_case_insensitive_ordering() {
        let samples = vec![
            sample("b.metric", "t", Some(1.0), None),
            sample("A.metric", "t", Some(1.0), None),
            sample("a.other", "t", Some(1.0), None),
        ];
        let names: Vec<_> = build_catalogs(&samples, &[], &DeclarationSet::default())
            .metrics
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["A.metric", "a.other", "b.metric"]);
    }

    #[test]
    fn test_dtype_overrides_majority() {
        assert_eq!(infer_value_kind("enum", 10, 0), ValueKind::String);
        assert_eq!(infer_value_kind("uint32", 0, 10), ValueKind::Numeric);
        assert_eq!(infer_value_kind("unknown", 1, 1), ValueKind::Numeric);
        assert_eq!(infer_value_kind("unknown", 0, 1), ValueKind::String);
    }

    #[test]
    fn test_event_catalog() {
        let param = |id| EventParam {
            param_id: id,
            param_value: Some(ParamValue::Integer(1)),
            param_type: ParamType::Varint,
        };
        let events = vec![
            DecodedEvent {
                time: "2024-12-07T00:00:05.000Z".to_string(),
                event_name: "VoLTE.Call.Event".to_string(),
                metric_id: Some(1002),
                params: vec![param(2), param(10), param(1)],
            },
            DecodedEvent {
                time: "2024-12-07T00:00:01.000Z".to_string(),
                event_name: "VoLTE.Call.Event".to_string(),
                metric_id: Some(1002),
                params: vec![param(4)],
            },
            DecodedEvent {
                time: "2024-12-07T00:00:03.000Z".to_string(),
                event_name: String::new(),
                metric_id: None,
                params: vec![],
            },
        ];
        let catalogs = build_catalogs(&[], &events, &DeclarationSet::default());
        assert_eq!(catalogs.events.len(), 2);
        assert_eq!(catalogs.events[0].event_name, "UnknownEvent");

        let call = &catalogs.events[1];
        assert_eq!(call.count, 2);
        assert_eq!(call.first_seen_time.as_deref(), Some("2024-12-07T00:00:01.000Z"));
        assert_eq!(call.last_seen_time.as_deref(), Some("2024-12-07T00:00:05.000Z"));
        assert_eq!(call.param_ids, vec!["1", "2", "4", "10"]);

        let json = serde_json::to_value(call).unwrap();
        assert_eq!(json["paramIds"], serde_json::json!(["1", "2", "4", "10"]));
    }

    #[test]
    fn test_times_compare_as_instants() {
        assert_eq!(
            compare_times("2024-12-07T01:00:00+01:00", "2024-12-07T00:30:00Z"),
            Ordering::Less
        );
        assert_eq!(compare_times("abc", "abd"), Ordering::Less);
    }

    #[test]
    fn test_neighbor_metrics_grouped_by_index() {
        let t = "2024-12-07T00:00:00.000Z";
        let samples = vec![
            sample("Radio.Lte.Neighbor[10].Rsrp", t, Some(-110.0), None),
            sample("Radio.Lte.Neighbor[2].Rsrp", t, Some(-105.0), None),
            sample("Radio.Lte.Neighbor[2].Pci", t, Some(301.0), None),
            sample("Radio.Lte.Neighbor[2].Rsrp", t, Some(-104.0), None),
            sample("Radio.Lte.Neighbor[2].Sinr", t, Some(3.0), None),
            sample("Radio.Lte.ServingCell.Rsrp", t, Some(-90.0), None),
        ];
        let neighbors = extract_neighbor_metrics(&samples);

        let summary: Vec<(u32, &str, usize)> = neighbors
            .iter()
            .map(|n| (n.neighbor_index, n.field.as_str(), n.sample_count))
            .collect();
        assert_eq!(summary, vec![(2, "Pci", 1), (2, "Rsrp", 2), (10, "Rsrp", 1)]);
        assert_eq!(neighbors[1].name, "Radio.Lte.Neighbor[2].Rsrp");
    }

    #[test]
    fn test_catalog_defaults_and_groups() {
        let t = "2024-12-07T00:00:00.000Z";
        let samples = vec![
            sample("Audio.Pesq.Mos", t, Some(3.9), None),
            sample("Radio.Lte.ServingCell.Rsrp", t, Some(-90.0), None),
        ];
        let catalogs = build_catalogs(&samples, &[], &DeclarationSet::default());
        let sidebar = build_sidebar(&catalogs, &samples);

        assert_eq!(
            sidebar.defaults.rsrp_metric_name.as_deref(),
            Some("Radio.Lte.ServingCell.Rsrp")
        );
        assert_eq!(sidebar.defaults.mos_metric_name.as_deref(), Some("Audio.Pesq.Mos"));
        // No SINR metric: falls back to the first catalog entry
        assert_eq!(sidebar.defaults.sinr_metric_name.as_deref(), Some("Audio.Pesq.Mos"));

        assert_eq!(sidebar.groups.len(), 1);
        assert_eq!(sidebar.groups[0].title, ALL_KPIS_GROUP);
        assert_eq!(
            sidebar.groups[0].items,
            vec!["Audio.Pesq.Mos", "Radio.Lte.ServingCell.Rsrp"]
        );
        assert!(sidebar.neighbors.is_empty());

        assert_eq!(catalog_defaults(&[]), CatalogDefaults::default());
    }

    #[test]
    fn test_sidebar_group_is_capped() {
        let t = "2024-12-07T00:00:00.000Z";
        let samples: Vec<_> = (0..MAX_GROUP_ITEMS + 5)
            .map(|i| sample(&format!("Metric.{i:05}"), t, Some(1.0), None))
            .collect();
        let catalogs = build_catalogs(&samples, &[], &DeclarationSet::default());
        assert_eq!(sidebar_groups(&catalogs.metrics)[0].items.len(), MAX_GROUP_ITEMS);
    }
}
