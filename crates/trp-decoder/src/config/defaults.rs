/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Framing limits
pub const DEFAULT_MAX_RECORD_LEN: usize = 262_144;
pub const DEFAULT_MAX_FRAME_SCAN: usize = 2_000_000;
pub const DEFAULT_MAX_FAIL_STREAK: usize = 20_000;
pub const DEFAULT_PROBE_RECORDS: usize = 200;
pub const DEFAULT_PROBE_FAIL_LIMIT: usize = 25;

// Output caps per import
pub const DEFAULT_MAX_KPI_ROWS: usize = 500_000;
pub const DEFAULT_MAX_EVENT_ROWS: usize = 200_000;

// Compression sniffing
pub const DEFAULT_HEADER_SCAN_WINDOW: usize = 64;
pub const DEFAULT_RAW_DEFLATE_MIN_RATIO: f64 = 0.2;

// Record heuristics
pub const DEFAULT_MIN_PRINTABLE_RATIO: f64 = 0.75;
pub const DEFAULT_SYNTHETIC_STEP_MS: u64 = 100;
pub const MIN_PLAUSIBLE_EPOCH_SECONDS: u64 = 946_684_800; // 2000-01-01
pub const MAX_PLAUSIBLE_EPOCH_SECONDS: u64 = 4_102_444_800; // 2100-01-01

// Runtime
pub const DEFAULT_IMPORT_TIMEOUT: &str = "10m";
pub const DEFAULT_MAX_CONCURRENT_IMPORTS: usize = 4;
pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 4 * 1024 * 1024 * 1024;
pub const DEFAULT_SERIES_MAX_POINTS: usize = 50_000;
