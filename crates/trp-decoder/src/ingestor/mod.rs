//! Variant pipelines that turn an extracted TRP tree into samples and events
//!
//! Every pipeline works on a [`DecodeSession`], which owns the per-import tools
//! (sniffer, frame selector, record decoder), the dictionaries loaded so far, the
//! bounded row sink and the synthetic clock. Nothing in a session outlives one import.

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::Config;
use crate::dictionary::{DeclarationKind, DeclarationParser, DeclarationSet, LookupParser, LookupTables};
use crate::errors::{DecodeError, TrpResult};
use crate::framing::{FrameScan, FrameSelector};
use crate::models::{ArchiveVariant, DecodedEvent, DecodedSample};
use crate::record::{DecodedRecord, RecordDecoder};
use crate::utils::decompression::CompressionSniffer;
use crate::utils::text::truncate_chars;
use crate::utils::time::{SyntheticClock, format_timestamp};

pub mod cdf;
pub mod layout;
pub mod provider_channels;
pub mod raw;
pub mod sink;
pub mod track;

pub use layout::{ArchiveLayout, ProviderDir, detect_layout};
pub use sink::DecodeSink;
pub use track::{TrackParse, parse_track, parse_track_file};

const RAW_EVENT_KEYWORDS: [&str; 6] = ["volte", "ims", "call", "sip", "rtp", "event"];
const RAW_EVENT_TEXT_CHARS: usize = 80;

/// A decoding strategy for one archive variant
pub trait VariantPipeline {
    fn variant(&self) -> ArchiveVariant;

    /// Decode `layout` into `session`, returning the `channelParser` label
    fn run(&self, layout: &ArchiveLayout, session: &mut DecodeSession<'_>) -> TrpResult<String>;
}

/// The pipeline that handles `variant`
pub fn pipeline_for(variant: ArchiveVariant) -> Box<dyn VariantPipeline> {
    match variant {
        ArchiveVariant::Cdf => Box::new(cdf::CdfPipeline),
        ArchiveVariant::Raw => Box::new(raw::RawPipeline),
        ArchiveVariant::ProviderChannels => Box::new(provider_channels::ProviderChannelsPipeline),
    }
}

/// Declarations and lookup tables accumulated for one import
#[derive(Debug, Clone, Default)]
pub struct Dictionaries {
    pub declarations: DeclarationSet,
    pub lookups: LookupTables,
}

impl Dictionaries {
    pub fn is_loaded(&self) -> bool {
        !self.declarations.is_empty() || !self.lookups.is_empty()
    }

    /// Emit `record` as a sample or event of the declaration `id` resolves to.
    ///
    /// Returns `false` when `id` is not declared.
    pub fn emit(&self, record: &DecodedRecord, id: Option<u64>, time: &str, sink: &mut DecodeSink) -> bool {
        let Some(declaration) = id.and_then(|id| self.declarations.get(id)) else {
            return false;
        };

        match declaration.kind {
            DeclarationKind::Event => sink.push_event(DecodedEvent {
                time: time.to_string(),
                event_name: declaration.name.clone(),
                metric_id: Some(declaration.metric_id),
                params: record.params.clone(),
            }),
            DeclarationKind::Metric => {
                let value_num = record.numeric_value(Some(declaration.metric_id));
                let mut value_str = record.value_str.clone();
                if value_str.is_none()
                    && let (Some(value), Some(table)) = (value_num, declaration.lookup_table_name.as_deref())
                {
                    value_str = self.lookups.label(table, value).map(str::to_string);
                }
                sink.push_sample(DecodedSample {
                    time: time.to_string(),
                    metric_id: declaration.metric_id,
                    name: declaration.name.clone(),
                    value_num,
                    value_str,
                    dtype: declaration.dtype.clone(),
                    lookup: declaration.lookup_table_name.clone(),
                });
            }
        }
        true
    }
}

/// Best-effort event for an unresolved record whose text looks like signalling
fn raw_event(record: &DecodedRecord, time: &str) -> Option<DecodedEvent> {
    let text = record.value_str.as_deref()?;
    let lower = text.to_lowercase();
    if !RAW_EVENT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return None;
    }
    Some(DecodedEvent {
        time: time.to_string(),
        event_name: format!("RawEvent.{}", truncate_chars(text, RAW_EVENT_TEXT_CHARS)),
        metric_id: None,
        params: record.params.clone(),
    })
}

/// Per-import decoding state shared by the pipelines
#[derive(Debug)]
pub struct DecodeSession<'c> {
    pub config: &'c Config,
    pub sniffer: CompressionSniffer,
    pub selector: FrameSelector,
    pub records: RecordDecoder,
    pub dictionaries: Dictionaries,
    pub sink: DecodeSink,
    pub clock: SyntheticClock,
    /// Records framed across every stream
    pub frames: usize,
}

impl<'c> DecodeSession<'c> {
    pub fn new(config: &'c Config, anchor: DateTime<Utc>) -> Self {
        Self {
            config,
            sniffer: CompressionSniffer::from_config(&config.heuristics),
            selector: FrameSelector::from_config(&config.limits),
            records: RecordDecoder::from_config(&config.heuristics),
            dictionaries: Dictionaries::default(),
            sink: DecodeSink::new(&config.limits),
            clock: SyntheticClock::new(anchor, config.heuristics.synthetic_step()),
            frames: 0,
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.sink.warnings.push(message);
    }

    /// Read and decompress a required file; either failure aborts the import
    pub fn read_required(&self, path: &Path) -> TrpResult<Vec<u8>> {
        let bytes = std::fs::read(path).map_err(|e| DecodeError::io(path, e))?;
        let decompressed = self
            .sniffer
            .decompress(&bytes)
            .map_err(|e| DecodeError::decompression(path.display().to_string(), e))?;
        debug!(
            "{}: {} bytes -> {} bytes ({})",
            path.display(),
            bytes.len(),
            decompressed.data.len(),
            decompressed.method.as_str()
        );
        Ok(decompressed.data)
    }

    /// Read and decompress an optional file, turning every failure into a warning
    pub fn read_optional(&mut self, path: Option<&Path>, label: &str) -> Option<Vec<u8>> {
        let Some(path) = path else {
            self.warn(format!("{label} missing"));
            return None;
        };
        match self.read_required(path) {
            Ok(data) => Some(data),
            Err(e) => {
                self.warn(format!("{label} unreadable: {e}"));
                None
            }
        }
    }

    /// Parse a lookup table file into the session dictionaries
    pub fn load_lookups(&mut self, path: Option<&Path>, label: &str) {
        let Some(data) = self.read_optional(path, label) else {
            return;
        };
        let tables = LookupParser::new(self.config.heuristics.min_printable_ratio).parse(&data);
        if tables.is_empty() {
            self.warn(format!("{label} yielded no lookup tables"));
        }
        self.dictionaries.lookups.merge(tables);
    }

    /// Parse a declarations file into the session dictionaries.
    ///
    /// Lookup links only resolve against tables loaded before this call.
    pub fn load_declarations(&mut self, path: Option<&Path>, label: &str) {
        let Some(data) = self.read_optional(path, label) else {
            return;
        };
        let parsed = DeclarationParser::new(self.config.heuristics.min_printable_ratio)
            .parse(&data, &self.dictionaries.lookups);
        if parsed.is_empty() {
            self.warn(format!("{label} yielded no declarations"));
        }
        self.dictionaries.declarations.merge(parsed);
    }

    /// Frame and decode one channel stream.
    ///
    /// With `raw_events`, unresolved records carrying signalling-like text become
    /// `RawEvent.*` events.
    pub fn decode_channel_stream(&mut self, data: &[u8], raw_events: bool) -> FrameScan {
        let Self {
            selector,
            records,
            dictionaries,
            sink,
            clock,
            ..
        } = self;

        let scan = selector.scan(data, |payload| {
            let record = records.decode(payload);
            let id = record.resolve_id(&dictionaries.declarations);
            let time = format_timestamp(clock.stamp(record.timestamp));
            if dictionaries.emit(&record, id, &time, sink) {
                return;
            }
            sink.unknown_frames += 1;
            if raw_events && let Some(event) = raw_event(&record, &time) {
                sink.push_event(event);
            }
        });

        self.frames += scan.frames;
        debug!(
            "channel stream: {} frames via {}, {} unknown so far",
            scan.frames,
            scan.strategy.as_str(),
            self.sink.unknown_frames
        );
        scan
    }
}
