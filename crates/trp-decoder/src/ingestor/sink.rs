//! Bounded accumulation of decoded rows

use tracing::warn;

use crate::config::LimitsConfig;
use crate::models::{DecodedEvent, DecodedSample};

/// Collects samples and events for one import, enforcing the row caps.
///
/// Rows past a cap are dropped; the first drop of each kind records one warning.
#[derive(Debug, Clone)]
pub struct DecodeSink {
    max_kpi_rows: usize,
    max_event_rows: usize,
    pub samples: Vec<DecodedSample>,
    pub events: Vec<DecodedEvent>,
    pub unknown_frames: usize,
    pub warnings: Vec<String>,
    samples_truncated: bool,
    events_truncated: bool,
}

impl DecodeSink {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            max_kpi_rows: limits.max_kpi_rows,
            max_event_rows: limits.max_event_rows,
            samples: Vec::new(),
            events: Vec::new(),
            unknown_frames: 0,
            warnings: Vec::new(),
            samples_truncated: false,
            events_truncated: false,
        }
    }

    pub fn push_sample(&mut self, sample: DecodedSample) {
        if self.samples.len() < self.max_kpi_rows {
            self.samples.push(sample);
        } else if !self.samples_truncated {
            self.samples_truncated = true;
            let message = format!(
                "KPI sample limit of {} reached; further samples dropped",
                self.max_kpi_rows
            );
            warn!("{}", message);
            self.warnings.push(message);
        }
    }

    pub fn push_event(&mut self, event: DecodedEvent) {
        if self.events.len() < self.max_event_rows {
            self.events.push(event);
        } else if !self.events_truncated {
            self.events_truncated = true;
            let message = format!(
                "event limit of {} reached; further events dropped",
                self.max_event_rows
            );
            warn!("{}", message);
            self.warnings.push(message);
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.samples_truncated || self.events_truncated
    }
}
