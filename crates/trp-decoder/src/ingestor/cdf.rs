//! Provider CDF directories: `providers/<sp>/cdf/{lookuptables,declarations,data}.cdf`
//!
//! `data.cdf` is a sequence of top-level length-delimited records. Field 1 of a record
//! is its timestamp, either a nested `{1: seconds, 2: nanos}` message or a bare epoch
//! varint; every other length-delimited field is one sample. A record without nested
//! samples is decoded as a single sample itself.

use chrono::{DateTime, Utc};
use tracing::info;

use super::provider_channels::{PARSER_NAME as PROVIDER_CHANNELS, ProviderChannelsPipeline};
use super::{ArchiveLayout, DecodeSession, VariantPipeline};
use crate::errors::TrpResult;
use crate::models::ArchiveVariant;
use crate::utils::time::{datetime_from_epoch, format_timestamp, is_plausible_epoch};
use crate::wire::{FieldIter, WireValue};

pub const PARSER_NAME: &str = "cdf";
const TIMESTAMP_FIELD: u64 = 1;
const MAX_NANOS: u64 = 999_999_999;

#[derive(Debug, Clone, Copy, Default)]
pub struct CdfPipeline;

fn record_timestamp(value: &WireValue<'_>) -> Option<DateTime<Utc>> {
    match value {
        WireValue::Varint(v) if is_plausible_epoch(*v) => datetime_from_epoch(*v, 0),
        WireValue::LengthDelimited(nested) => {
            let mut seconds = None;
            let mut nanos = 0u64;
            for field in FieldIter::new(nested) {
                match (field.number, field.value) {
                    (1, WireValue::Varint(s)) if seconds.is_none() => seconds = Some(s),
                    (2, WireValue::Varint(n)) => nanos = n.min(MAX_NANOS),
                    _ => {}
                }
            }
            seconds
                .filter(|s| is_plausible_epoch(*s))
                .and_then(|s| datetime_from_epoch(s, nanos as u32))
        }
        _ => None,
    }
}

/// Decode one inflated `data.cdf` buffer into the session. Returns the record count.
pub fn decode_data(session: &mut DecodeSession<'_>, data: &[u8]) -> usize {
    let max_records = session.config.limits.max_frame_scan;
    let DecodeSession {
        records,
        dictionaries,
        sink,
        clock,
        ..
    } = session;

    let mut count = 0;
    for field in FieldIter::with_max_fields(data, max_records) {
        let WireValue::LengthDelimited(record) = field.value else {
            continue;
        };
        count += 1;

        let mut timestamp = None;
        let mut samples = Vec::new();
        for inner in FieldIter::new(record) {
            if inner.number == TIMESTAMP_FIELD && timestamp.is_none() {
                timestamp = record_timestamp(&inner.value);
                if timestamp.is_some() {
                    continue;
                }
            }
            if let WireValue::LengthDelimited(sample) = inner.value {
                samples.push(sample);
            }
        }
        if samples.is_empty() {
            samples.push(record);
        }

        for sample in samples {
            let decoded = records.decode(sample);
            let id = decoded.resolve_id(&dictionaries.declarations);
            let time = format_timestamp(clock.stamp(timestamp.or(decoded.timestamp)));
            if !dictionaries.emit(&decoded, id, &time, sink) {
                sink.unknown_frames += 1;
            }
        }
    }

    session.frames += count;
    count
}

impl VariantPipeline for CdfPipeline {
    fn variant(&self) -> ArchiveVariant {
        ArchiveVariant::Cdf
    }

    fn run(&self, layout: &ArchiveLayout, session: &mut DecodeSession<'_>) -> TrpResult<String> {
        // Every provider's tables first so declarations can link to any of them
        for provider in &layout.providers {
            let label = format!("{}/cdf/lookuptables.cdf", provider.name);
            session.load_lookups(provider.lookuptables_cdf.as_deref(), &label);
        }
        for provider in &layout.providers {
            let label = format!("{}/cdf/declarations.cdf", provider.name);
            session.load_declarations(provider.declarations_cdf.as_deref(), &label);
        }

        for provider in &layout.providers {
            let Some(path) = provider.data_cdf.as_deref() else {
                session.warn(format!("{}/cdf/data.cdf missing", provider.name));
                continue;
            };
            let data = session.read_required(path)?;
            let count = decode_data(session, &data);
            info!("{}: decoded {} data.cdf records", provider.name, count);
        }

        if session.sink.samples.is_empty() && !layout.provider_channel_logs.is_empty() {
            info!(
                "data.cdf produced no samples, falling back to {} provider channel logs",
                layout.provider_channel_logs.len()
            );
            ProviderChannelsPipeline.decode_logs(layout, session);
            return Ok(format!("{PARSER_NAME}+{PROVIDER_CHANNELS}"));
        }

        Ok(PARSER_NAME.to_string())
    }
}
