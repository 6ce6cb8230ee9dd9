use serde::{Deserialize, Serialize};

/// Archive layouts the decoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveVariant {
    /// `providers/<sp>/cdf/*.cdf`
    Cdf,
    /// Root `channel.log` with `.bin` dictionaries
    Raw,
    /// Only `providers/*/channel.log`
    ProviderChannels,
}

/// What the extracted tree contained, for diagnosing odd archives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesSummary {
    pub total_entries: usize,
    pub has_channel_log: bool,
    pub has_declarations: bool,
    pub has_lookup_tables: bool,
    pub has_track_xml: bool,
    pub sample_entries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub variant: ArchiveVariant,
    /// `cdf`, `varint_len`, `u32_len`, `provider_channels` or `cdf+provider_channels`
    pub channel_parser: String,
    pub channel_log_frames: usize,
    pub unknown_frames: usize,
    pub decoded_samples: usize,
    pub decoded_events: usize,
    pub dictionary_loaded: bool,
    pub declarations_count: usize,
    pub lookup_tables_count: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unknown_declaration_records: Vec<String>,
    pub zip_entries_summary: EntriesSummary,
}

impl ImportReport {
    pub fn new(variant: ArchiveVariant, channel_parser: impl Into<String>) -> Self {
        Self {
            variant,
            channel_parser: channel_parser.into(),
            channel_log_frames: 0,
            unknown_frames: 0,
            decoded_samples: 0,
            decoded_events: 0,
            dictionary_loaded: false,
            declarations_count: 0,
            lookup_tables_count: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
            unknown_declaration_records: Vec::new(),
            zip_entries_summary: EntriesSummary::default(),
        }
    }
}
