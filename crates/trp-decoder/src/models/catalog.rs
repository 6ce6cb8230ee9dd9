use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Numeric,
    String,
}

/// Aggregates over the samples of one metric
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricStats {
    pub sample_count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub first_time: Option<String>,
    pub last_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricCatalogEntry {
    pub metric_id: u64,
    pub name: String,
    pub dtype: String,
    pub lookup: Option<String>,
    pub value_kind: ValueKind,
    pub path_segments: Vec<String>,
    pub tags: Vec<String>,
    pub stats: MetricStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCatalogEntry {
    pub event_name: String,
    pub metric_id: Option<u64>,
    pub count: usize,
    pub first_seen_time: Option<String>,
    pub last_seen_time: Option<String>,
    /// Distinct param ids seen on this event, as decimal strings in numeric order
    pub param_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalogs {
    pub metrics: Vec<MetricCatalogEntry>,
    pub events: Vec<EventCatalogEntry>,
}

/// Standard KPI families picked out of the metric catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiType {
    Rsrp,
    Rsrq,
    Sinr,
    DlTp,
    UlTp,
}

impl KpiType {
    pub const ALL: [KpiType; 5] = [
        KpiType::Rsrp,
        KpiType::Rsrq,
        KpiType::Sinr,
        KpiType::DlTp,
        KpiType::UlTp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsrp => "rsrp",
            Self::Rsrq => "rsrq",
            Self::Sinr => "sinr",
            Self::DlTp => "dl_tp",
            Self::UlTp => "ul_tp",
        }
    }
}

impl fmt::Display for KpiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingKpi {
    pub kpi_type: KpiType,
    pub reason: String,
    pub candidates_found_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSelection {
    /// Chosen metric name per KPI type, `None` when nothing matched
    pub chosen: BTreeMap<KpiType, Option<String>>,
    pub stats: BTreeMap<KpiType, MetricStats>,
    pub missing_data: Vec<MissingKpi>,
}
