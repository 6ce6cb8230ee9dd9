use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod report;
pub mod sidebar;

pub use catalog::{
    Catalogs, EventCatalogEntry, KpiSelection, KpiType, MetricCatalogEntry, MetricStats,
    MissingKpi, ValueKind,
};
pub use report::{ArchiveVariant, EntriesSummary, ImportReport};
pub use sidebar::{CatalogDefaults, NeighborMetric, RunSidebar, SidebarGroup};

/// One KPI reading resolved through the declarations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedSample {
    /// RFC 3339 UTC, millisecond precision
    pub time: String,
    pub metric_id: u64,
    pub name: String,
    pub value_num: Option<f64>,
    pub value_str: Option<String>,
    pub dtype: String,
    pub lookup: Option<String>,
}

/// A discrete signalling event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedEvent {
    pub time: String,
    pub event_name: String,
    pub metric_id: Option<u64>,
    pub params: Vec<EventParam>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Varint,
    Float32,
    Float64,
    String,
    Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(u64),
    Float(f64),
    Text(String),
}

/// A raw record field kept alongside an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventParam {
    /// Field number inside the record
    pub param_id: u64,
    /// Absent for non-finite floats
    pub param_value: Option<ParamValue>,
    pub param_type: ParamType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    pub time: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub alt: Option<f64>,
    pub speed: Option<f64>,
}

/// Everything decoded from one archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeResult {
    pub kpi_samples: Vec<DecodedSample>,
    pub events: Vec<DecodedEvent>,
    pub track_points: Vec<TrackPoint>,
    pub catalogs: Catalogs,
    pub kpi_selection: KpiSelection,
    pub import_report: ImportReport,
}

impl DecodeResult {
    /// The archive was structurally fine but nothing could be decoded from it
    pub fn is_soft_failure(&self) -> bool {
        self.kpi_samples.is_empty() && self.events.is_empty()
    }

    /// Earliest and latest sample or event time
    pub fn time_range(&self) -> Option<(String, String)> {
        let times = self
            .kpi_samples
            .iter()
            .map(|s| s.time.as_str())
            .chain(self.events.iter().map(|e| e.time.as_str()));
        let mut range: Option<(&str, &str)> = None;
        for t in times {
            range = Some(match range {
                None => (t, t),
                Some((lo, hi)) => (lo.min(t), hi.max(t)),
            });
        }
        range.map(|(lo, hi)| (lo.to_string(), hi.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_serializes_camel_case() {
        let sample = DecodedSample {
            time: "2024-12-07T00:06:40.000Z".to_string(),
            metric_id: 1001,
            name: "Radio.Lte.ServingCell.Rsrp".to_string(),
            value_num: Some(95.0),
            value_str: None,
            dtype: "unknown".to_string(),
            lookup: None,
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["metricId"], 1001);
        assert_eq!(json["valueNum"], 95.0);
        assert!(json["valueStr"].is_null());
    }

    #[test]
    fn test_param_value_untagged() {
        let param = EventParam {
            param_id: 4,
            param_value: Some(ParamValue::Text("DIAL_START".to_string())),
            param_type: ParamType::String,
        };
        let json = serde_json::to_string(&param).unwrap();
        assert_eq!(
            json,
            r#"{"paramId":4,"paramValue":"DIAL_START","paramType":"string"}"#
        );
        let back: EventParam = serde_json::from_str(&json).unwrap();
        assert_eq!(back, param);
    }
}
