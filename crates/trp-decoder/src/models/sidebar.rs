use serde::{Deserialize, Serialize};

/// LTE neighbour measurement found in the decoded samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborMetric {
    pub name: String,
    pub neighbor_index: u32,
    /// `Pci`, `Rsrp`, `Rsrq`, `Earfcn` or `Frequency`, as spelled in the name
    pub field: String,
    pub sample_count: usize,
}

/// Metric names a viewer opens first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDefaults {
    pub rsrp_metric_name: Option<String>,
    pub sinr_metric_name: Option<String>,
    pub mos_metric_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidebarGroup {
    pub title: String,
    pub items: Vec<String>,
}

/// Navigation view of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSidebar {
    pub groups: Vec<SidebarGroup>,
    pub neighbors: Vec<NeighborMetric>,
    pub defaults: CatalogDefaults,
}
