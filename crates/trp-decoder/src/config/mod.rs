use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use crate::errors::{DecodeError, TrpResult};
use defaults::*;

/// Which varint position of a record is trusted as its message id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdPriority {
    /// First varint, overridden by the second when it is positive
    #[default]
    SecondVarint,
    /// First varint only
    FirstVarint,
}

/// Hard resource bounds applied to every import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest single framed record accepted, in bytes
    #[serde(default = "default_max_record_len")]
    pub max_record_len: usize,
    /// Maximum frames decoded from one channel stream
    #[serde(default = "default_max_frame_scan")]
    pub max_frame_scan: usize,
    /// Consecutive single-byte framing failures before a stream is abandoned
    #[serde(default = "default_max_fail_streak")]
    pub max_fail_streak: usize,
    /// Records attempted per strategy when choosing a framing
    #[serde(default = "default_probe_records")]
    pub probe_records: usize,
    /// Failures after which a framing probe gives up early
    #[serde(default = "default_probe_fail_limit")]
    pub probe_fail_limit: usize,
    /// KPI rows emitted per import before truncation
    #[serde(default = "default_max_kpi_rows")]
    pub max_kpi_rows: usize,
    /// Event rows emitted per import before truncation
    #[serde(default = "default_max_event_rows")]
    pub max_event_rows: usize,
}

/// Tunables for the decode heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicsConfig {
    /// Leading bytes searched for a zlib header
    #[serde(default = "default_header_scan_window")]
    pub header_scan_window: usize,
    /// Minimum raw-deflate output, as a fraction of the compressed input, to be believed
    #[serde(default = "default_raw_deflate_min_ratio")]
    pub raw_deflate_min_ratio: f64,
    /// Share of printable characters required before bytes are treated as text
    #[serde(default = "default_min_printable_ratio")]
    pub min_printable_ratio: f64,
    /// Which varint is taken as a record's message id
    #[serde(default)]
    pub id_priority: IdPriority,
    /// Clock advance for records without their own timestamp
    #[serde(default = "default_synthetic_step_ms")]
    pub synthetic_step_ms: u64,
}

/// Settings for the command-line front end
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Wall-clock budget for a single import
    #[serde(default = "default_import_timeout", with = "duration_serde::duration")]
    pub import_timeout: Duration,
    /// Imports decoded at the same time
    #[serde(default = "default_max_concurrent_imports")]
    pub max_concurrent_imports: usize,
    /// Ceiling on uncompressed bytes extracted from one archive
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
    /// Scratch directory for extraction; the system temp dir when unset
    pub work_dir: Option<PathBuf>,
    /// Points returned per series by the run store
    #[serde(default = "default_series_max_points")]
    pub series_max_points: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub heuristics: HeuristicsConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_max_record_len() -> usize {
    DEFAULT_MAX_RECORD_LEN
}

fn default_max_frame_scan() -> usize {
    DEFAULT_MAX_FRAME_SCAN
}

fn default_max_fail_streak() -> usize {
    DEFAULT_MAX_FAIL_STREAK
}

fn default_probe_records() -> usize {
    DEFAULT_PROBE_RECORDS
}

fn default_probe_fail_limit() -> usize {
    DEFAULT_PROBE_FAIL_LIMIT
}

fn default_max_kpi_rows() -> usize {
    DEFAULT_MAX_KPI_ROWS
}

fn default_max_event_rows() -> usize {
    DEFAULT_MAX_EVENT_ROWS
}

fn default_header_scan_window() -> usize {
    DEFAULT_HEADER_SCAN_WINDOW
}

fn default_raw_deflate_min_ratio() -> f64 {
    DEFAULT_RAW_DEFLATE_MIN_RATIO
}

fn default_min_printable_ratio() -> f64 {
    DEFAULT_MIN_PRINTABLE_RATIO
}

fn default_synthetic_step_ms() -> u64 {
    DEFAULT_SYNTHETIC_STEP_MS
}

fn default_import_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_IMPORT_TIMEOUT).unwrap_or(Duration::from_secs(600))
}

fn default_max_concurrent_imports() -> usize {
    DEFAULT_MAX_CONCURRENT_IMPORTS
}

fn default_max_archive_bytes() -> u64 {
    DEFAULT_MAX_ARCHIVE_BYTES
}

fn default_series_max_points() -> usize {
    DEFAULT_SERIES_MAX_POINTS
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_record_len: default_max_record_len(),
            max_frame_scan: default_max_frame_scan(),
            max_fail_streak: default_max_fail_streak(),
            probe_records: default_probe_records(),
            probe_fail_limit: default_probe_fail_limit(),
            max_kpi_rows: default_max_kpi_rows(),
            max_event_rows: default_max_event_rows(),
        }
    }
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            header_scan_window: default_header_scan_window(),
            raw_deflate_min_ratio: default_raw_deflate_min_ratio(),
            min_printable_ratio: default_min_printable_ratio(),
            id_priority: IdPriority::default(),
            synthetic_step_ms: default_synthetic_step_ms(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            import_timeout: default_import_timeout(),
            max_concurrent_imports: default_max_concurrent_imports(),
            max_archive_bytes: default_max_archive_bytes(),
            work_dir: None,
            series_max_points: default_series_max_points(),
        }
    }
}

impl HeuristicsConfig {
    pub fn synthetic_step(&self) -> Duration {
        Duration::from_millis(self.synthetic_step_ms)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "trp-decoder.toml".to_string());
        Self::load_from_file(&config_file)
    }

    /// Load from `config_file`, falling back to defaults when the file does not exist.
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let config = if std::path::Path::new(config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            let config: Self = toml::from_str(&contents)?;
            info!("Configuration loaded from: {}", config_file);
            config
        } else {
            info!("No config file at {}, using defaults", config_file);
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would disable a safety bound or make a heuristic meaningless.
    pub fn validate(&self) -> TrpResult<()> {
        let limits = &self.limits;
        for (name, value) in [
            ("limits.max_record_len", limits.max_record_len),
            ("limits.max_frame_scan", limits.max_frame_scan),
            ("limits.max_fail_streak", limits.max_fail_streak),
            ("limits.probe_records", limits.probe_records),
            ("limits.max_kpi_rows", limits.max_kpi_rows),
            ("limits.max_event_rows", limits.max_event_rows),
            ("runtime.max_concurrent_imports", self.runtime.max_concurrent_imports),
        ] {
            if value == 0 {
                return Err(DecodeError::configuration(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        for (name, ratio) in [
            (
                "heuristics.raw_deflate_min_ratio",
                self.heuristics.raw_deflate_min_ratio,
            ),
            (
                "heuristics.min_printable_ratio",
                self.heuristics.min_printable_ratio,
            ),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(DecodeError::configuration(format!(
                    "{name} must be between 0 and 1 (got {ratio})"
                )));
            }
        }

        if self.heuristics.header_scan_window < 2 {
            return Err(DecodeError::configuration(
                "heuristics.header_scan_window must be at least 2",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.limits.max_record_len, 262_144);
        assert_eq!(config.limits.max_kpi_rows, 500_000);
        assert_eq!(config.limits.max_event_rows, 200_000);
        assert_eq!(config.limits.max_fail_streak, 20_000);
        assert_eq!(config.heuristics.id_priority, IdPriority::SecondVarint);
        assert_eq!(config.runtime.import_timeout, Duration::from_secs(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [limits]
            max_kpi_rows = 10

            [heuristics]
            id_priority = "first_varint"

            [runtime]
            import_timeout = "30s"
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.max_kpi_rows, 10);
        assert_eq!(config.limits.max_event_rows, DEFAULT_MAX_EVENT_ROWS);
        assert_eq!(config.heuristics.id_priority, IdPriority::FirstVarint);
        assert_eq!(config.runtime.import_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_validation_rejects_zero_caps_and_bad_ratios() {
        let mut config = Config::default();
        config.limits.max_event_rows = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.heuristics.min_printable_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = Config::load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.limits.max_record_len, DEFAULT_MAX_RECORD_LEN);
        assert!(!path.exists());
    }
}
