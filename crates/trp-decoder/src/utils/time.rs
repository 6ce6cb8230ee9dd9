//! Timestamp helpers shared by the decode pipelines

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::time::Duration;

use crate::config::defaults::{MAX_PLAUSIBLE_EPOCH_SECONDS, MIN_PLAUSIBLE_EPOCH_SECONDS};

/// Whether a raw integer looks like a Unix epoch in seconds between 2000 and 2100
pub fn is_plausible_epoch(value: u64) -> bool {
    (MIN_PLAUSIBLE_EPOCH_SECONDS..=MAX_PLAUSIBLE_EPOCH_SECONDS).contains(&value)
}

/// Epoch seconds plus optional nanoseconds to a UTC instant
pub fn datetime_from_epoch(seconds: u64, nanos: u32) -> Option<DateTime<Utc>> {
    let seconds = i64::try_from(seconds).ok()?;
    Utc.timestamp_opt(seconds, nanos.min(999_999_999)).single()
}

/// RFC 3339 with millisecond precision and a `Z` suffix
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp as found in track files: RFC 3339, or a naive ISO time taken as UTC
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Clock for records that carry no timestamp of their own.
///
/// Every stamped record advances the cursor by a fixed step; a record with a real
/// timestamp moves the cursor to that instant first.
#[derive(Debug, Clone)]
pub struct SyntheticClock {
    cursor: DateTime<Utc>,
    step: chrono::Duration,
}

impl SyntheticClock {
    pub fn new(anchor: DateTime<Utc>, step: Duration) -> Self {
        Self {
            cursor: anchor,
            step: chrono::Duration::from_std(step).unwrap_or(chrono::Duration::milliseconds(100)),
        }
    }

    /// Return the time for the next record and advance
    pub fn stamp(&mut self, observed: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let at = observed.unwrap_or(self.cursor);
        self.cursor = at + self.step;
        at
    }
}
