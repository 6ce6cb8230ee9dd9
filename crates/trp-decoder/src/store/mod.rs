//! In-memory registry of decoded runs
//!
//! The store is an explicit object owned by the caller, cheap to clone and safe to share
//! between concurrent imports. Runs live until the caller removes them or drops the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::build_sidebar;
use crate::models::{DecodeResult, RunSidebar};

pub type RunId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCounts {
    pub decoded_samples: usize,
    pub decoded_events: usize,
    pub decoded_frames: usize,
    pub track_points: usize,
}

/// Listing entry for a stored run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: RunId,
    pub filename: String,
    pub imported_at: DateTime<Utc>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub counts: RunCounts,
}

/// One point of a metric time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_str: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredRun {
    summary: RunSummary,
    result: Arc<DecodeResult>,
}

#[derive(Debug, Clone, Default)]
pub struct RunStore {
    runs: Arc<RwLock<HashMap<RunId, StoredRun>>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, filename: impl Into<String>, result: DecodeResult) -> RunId {
        let id = Uuid::new_v4();
        let (start_time, end_time) = result.time_range().unzip();
        let summary = RunSummary {
            id,
            filename: filename.into(),
            imported_at: Utc::now(),
            start_time,
            end_time,
            counts: RunCounts {
                decoded_samples: result.kpi_samples.len(),
                decoded_events: result.events.len(),
                decoded_frames: result.import_report.channel_log_frames,
                track_points: result.track_points.len(),
            },
        };
        info!("Stored run {} ({})", id, summary.filename);

        let mut runs = self.runs.write().await;
        runs.insert(
            id,
            StoredRun {
                summary,
                result: Arc::new(result),
            },
        );
        id
    }

    /// All runs, oldest import first
    pub async fn list(&self) -> Vec<RunSummary> {
        let runs = self.runs.read().await;
        let mut summaries: Vec<RunSummary> = runs.values().map(|r| r.summary.clone()).collect();
        summaries.sort_by(|a, b| a.imported_at.cmp(&b.imported_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    pub async fn get(&self, id: RunId) -> Option<Arc<DecodeResult>> {
        let runs = self.runs.read().await;
        runs.get(&id).map(|r| Arc::clone(&r.result))
    }

    pub async fn summary(&self, id: RunId) -> Option<RunSummary> {
        let runs = self.runs.read().await;
        runs.get(&id).map(|r| r.summary.clone())
    }

    pub async fn remove(&self, id: RunId) -> bool {
        let mut runs = self.runs.write().await;
        runs.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }

    /// Navigation groups, neighbour metrics and default metric names of a run
    pub async fn sidebar(&self, id: RunId) -> Option<RunSidebar> {
        let result = self.get(id).await?;
        Some(build_sidebar(&result.catalogs, &result.kpi_samples))
    }

    /// Samples of metric `name` in decode order, downsampled to `max_points`.
    ///
    /// `None` when the run does not exist; samples with no value are skipped.
    pub async fn series(&self, id: RunId, name: &str, max_points: usize) -> Option<Vec<SeriesPoint>> {
        let result = self.get(id).await?;
        let name = name.trim();
        let points: Vec<SeriesPoint> = result
            .kpi_samples
            .iter()
            .filter(|s| !name.is_empty() && s.name == name)
            .filter_map(|s| match (s.value_num, &s.value_str) {
                (Some(v), _) if v.is_finite() => Some(SeriesPoint {
                    time: s.time.clone(),
                    value: Some(v),
                    value_str: None,
                }),
                (_, Some(text)) => Some(SeriesPoint {
                    time: s.time.clone(),
                    value: None,
                    value_str: Some(text.clone()),
                }),
                _ => None,
            })
            .collect();
        let total = points.len();
        let points = downsample(points, max_points);
        debug!("Series '{}' of run {}: {} -> {} points", name, id, total, points.len());
        Some(points)
    }
}

/// Evenly spaced subset of `series` keeping the first and last element.
///
/// `max_points == 0` or a series already within the limit is returned unchanged; fewer
/// than three points keeps only the endpoints. Consecutive equal picks are collapsed.
pub fn downsample<T: Clone + PartialEq>(series: Vec<T>, max_points: usize) -> Vec<T> {
    let n = series.len();
    if max_points == 0 || n <= max_points {
        return series;
    }
    if max_points < 3 {
        return vec![series[0].clone(), series[n - 1].clone()];
    }

    let step = (n - 1) as f64 / (max_points - 1) as f64;
    let mut out: Vec<T> = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let index = ((i as f64 * step).round_ties_even() as usize).min(n - 1);
        let item = &series[index];
        if out.last() != Some(item) {
            out.push(item.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchiveVariant, Catalogs, DecodedSample, ImportReport, KpiSelection};
    use proptest::prelude::*;

    fn result_with(values: &[(u32, Option<f64>, Option<&str>)]) -> DecodeResult {
        let kpi_samples = values
            .iter()
            .map(|(second, num, text)| DecodedSample {
                time: format!("2024-12-07T00:00:{second:02}.000Z"),
                metric_id: 1001,
                name: "Radio.Lte.ServingCell.Rsrp".to_string(),
                value_num: *num,
                value_str: text.map(str::to_string),
                dtype: "float".to_string(),
                lookup: None,
            })
            .collect();
        DecodeResult {
            kpi_samples,
            events: vec![],
            track_points: vec![],
            catalogs: Catalogs::default(),
            kpi_selection: KpiSelection::default(),
            import_report: ImportReport::new(ArchiveVariant::Raw, "u32_len"),
        }
    }

    #[tokio::test]
    async fn test_insert_list_get_remove() {
        let store = RunStore::new();
        let id = store
            .insert("drive.trp", result_with(&[(5, Some(-90.0), None), (1, Some(-95.0), None)]))
            .await;

        let runs = store.list().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].filename, "drive.trp");
        assert_eq!(runs[0].counts.decoded_samples, 2);
        assert_eq!(runs[0].start_time.as_deref(), Some("2024-12-07T00:00:01.000Z"));
        assert_eq!(runs[0].end_time.as_deref(), Some("2024-12-07T00:00:05.000Z"));

        assert!(store.get(id).await.is_some());
        assert!(store.remove(id).await);
        assert!(store.get(id).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_series_skips_empty_values() {
        let store = RunStore::new();
        let id = store
            .insert(
                "drive.trp",
                result_with(&[(0, Some(-90.0), None), (1, None, None), (2, None, Some("n/a"))]),
            )
            .await;

        let series = store.series(id, " Radio.Lte.ServingCell.Rsrp ", 100).await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].value, Some(-90.0));
        assert_eq!(series[1].value_str.as_deref(), Some("n/a"));

        assert!(store.series(id, "", 100).await.unwrap().is_empty());
        assert!(store.series(Uuid::new_v4(), "x", 100).await.is_none());
    }

    #[tokio::test]
    async fn test_sidebar_lists_neighbors() {
        let store = RunStore::new();
        let mut result = result_with(&[(0, Some(-90.0), None)]);
        let mut neighbor = result.kpi_samples[0].clone();
        neighbor.name = "Radio.Lte.Neighbor[3].Rsrq".to_string();
        result.kpi_samples.push(neighbor);
        result.catalogs = crate::catalog::build_catalogs(
            &result.kpi_samples,
            &[],
            &crate::dictionary::DeclarationSet::default(),
        );
        let id = store.insert("drive.trp", result).await;

        let sidebar = store.sidebar(id).await.unwrap();
        assert_eq!(sidebar.neighbors.len(), 1);
        assert_eq!(sidebar.neighbors[0].neighbor_index, 3);
        assert_eq!(sidebar.neighbors[0].field, "Rsrq");
        assert_eq!(
            sidebar.defaults.rsrp_metric_name.as_deref(),
            Some("Radio.Lte.ServingCell.Rsrp")
        );
        assert_eq!(sidebar.groups[0].items.len(), 2);
        assert!(store.sidebar(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_store_shared_across_tasks() {
        let store = RunStore::new();
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert(format!("run-{i}.trp"), result_with(&[])).await
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len().await, 8);
    }

    #[test]
    fn test_downsample_endpoints() {
        let series: Vec<u32> = (0..10).collect();
        assert_eq!(downsample(series.clone(), 2), vec![0, 9]);
        assert_eq!(downsample(series.clone(), 4), vec![0, 3, 6, 9]);
        assert_eq!(downsample(series.clone(), 0), series);
        assert_eq!(downsample(series.clone(), 20), series);
    }

    proptest! {
        #[test]
        fn prop_downsample_bounds(n in 0usize..500, max in 1usize..100) {
            let series: Vec<usize> = (0..n).collect();
            let out = downsample(series, max);
            if n <= max {
                prop_assert_eq!(out.len(), n);
            } else {
                prop_assert!(out.len() <= max.max(2));
            }
            if n > 0 {
                prop_assert_eq!(out.first().copied(), Some(0));
                prop_assert_eq!(out.last().copied(), Some(n - 1));
            }
        }
    }
}
