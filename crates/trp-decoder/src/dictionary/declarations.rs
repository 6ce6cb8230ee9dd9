//! Metric declarations (`declarations.bin` / `declarations.cdf`)
//!
//! A declaration record is a length-delimited top-level field whose nested fields hold a
//! dotted metric name, a numeric id and optionally a type keyword and lookup table name.
//! Older recorders write declarations that do not nest cleanly; for those the parser
//! falls back to scanning the raw bytes for `name` + `0x10` + varint runs.

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::LookupTables;
use crate::wire::{FieldIter, WireValue, read_varint};

const MAX_RECORD_FIELDS: usize = 500;
const MAX_NAME_CHARS: usize = 200;
/// Records larger than this are not reported as unknown declarations
const MAX_UNKNOWN_RECORD_LEN: usize = 512;
const UNKNOWN_RECORD_PREVIEW: usize = 64;
pub const MAX_UNKNOWN_RECORDS: usize = 50;

const EVENT_KEYWORDS: [&str; 6] = ["event", "call", "ims", "sip", "rtp", "state"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Metric,
    Event,
}

impl DeclarationKind {
    pub fn classify(name: &str) -> Self {
        let lower = name.to_lowercase();
        if EVENT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            Self::Event
        } else {
            Self::Metric
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub metric_id: u64,
    pub name: String,
    pub dtype: String,
    pub lookup_table_name: Option<String>,
    pub kind: DeclarationKind,
}

/// Declarations keyed by metric id
#[derive(Debug, Clone, Default)]
pub struct DeclarationSet {
    by_id: BTreeMap<u64, Declaration>,
    /// Hex previews of records that looked like declarations but carried no name and id
    pub unknown_records: Vec<String>,
}

impl DeclarationSet {
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Declaration> {
        self.by_id.get(&id)
    }

    pub fn contains_id(&self, id: u64) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.by_id.values()
    }

    /// Insert unless the id is already declared
    pub fn insert(&mut self, declaration: Declaration) -> bool {
        if self.by_id.contains_key(&declaration.metric_id) {
            return false;
        }
        self.by_id.insert(declaration.metric_id, declaration);
        true
    }

    /// Fold in another provider's declarations; earlier ids win
    pub fn merge(&mut self, other: DeclarationSet) {
        for declaration in other.by_id.into_values() {
            self.insert(declaration);
        }
        for record in other.unknown_records {
            if self.unknown_records.len() >= MAX_UNKNOWN_RECORDS {
                break;
            }
            self.unknown_records.push(record);
        }
    }
}

fn dtype_pattern() -> Option<&'static regex::Regex> {
    static PATTERN: OnceLock<Option<regex::Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            regex::Regex::new(
                r"^(u?int(8|16|32|64)?|sint(32|64)|fixed(32|64)|float|double|string|bool(ean)?|enum|bytes|long|short|decimal|number|text)$",
            )
            .map_err(|e| warn!("dtype pattern failed to compile: {}", e))
            .ok()
        })
        .as_ref()
}

fn fallback_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?-u)([A-Za-z][A-Za-z0-9_.\[\]\-]{4,180})\x10")
                .map_err(|e| warn!("declaration fallback pattern failed to compile: {}", e))
                .ok()
        })
        .as_ref()
}

fn is_dtype_keyword(text: &str) -> bool {
    dtype_pattern().is_some_and(|re| re.is_match(&text.to_lowercase()))
}

/// Declaration buffer parser
#[derive(Debug, Clone)]
pub struct DeclarationParser {
    min_printable_ratio: f64,
}

impl DeclarationParser {
    pub fn new(min_printable_ratio: f64) -> Self {
        Self {
            min_printable_ratio,
        }
    }

    /// Parse `buf`, linking declarations to tables in `lookups` by name
    pub fn parse(&self, buf: &[u8], lookups: &LookupTables) -> DeclarationSet {
        let mut set = self.parse_structured(buf, lookups);
        if set.is_empty() {
            let recovered = self.parse_fallback(buf);
            debug!(
                "Structured declaration parse found nothing, text scan recovered {}",
                recovered.len()
            );
            set.by_id = recovered.by_id;
        } else {
            debug!("Parsed {} structured declarations", set.len());
        }
        set
    }

    fn parse_structured(&self, buf: &[u8], lookups: &LookupTables) -> DeclarationSet {
        let mut set = DeclarationSet::default();

        for field in FieldIter::new(buf) {
            let WireValue::LengthDelimited(record) = field.value else {
                continue;
            };

            match self.parse_record(record, lookups) {
                Some(declaration) => {
                    set.insert(declaration);
                }
                None => {
                    if !record.is_empty()
                        && record.len() <= MAX_UNKNOWN_RECORD_LEN
                        && set.unknown_records.len() < MAX_UNKNOWN_RECORDS
                    {
                        let preview = &record[..record.len().min(UNKNOWN_RECORD_PREVIEW)];
                        set.unknown_records.push(hex::encode(preview));
                    }
                }
            }
        }

        set
    }

    fn parse_record(&self, record: &[u8], lookups: &LookupTables) -> Option<Declaration> {
        let mut strings = Vec::new();
        let mut ints = Vec::new();

        for field in FieldIter::with_max_fields(record, MAX_RECORD_FIELDS) {
            match field.value {
                WireValue::Varint(v) => ints.push(v),
                WireValue::LengthDelimited(_) => {
                    if let Some(text) = field.value.as_text(self.min_printable_ratio) {
                        strings.push(text);
                    }
                }
                _ => {}
            }
        }

        let name_idx = strings
            .iter()
            .position(|s| s.contains('.') && s.chars().count() < MAX_NAME_CHARS)?;
        let metric_id = ints.iter().copied().find(|v| *v > 0)?;
        let name = strings.remove(name_idx);

        let dtype = strings
            .iter()
            .find(|s| is_dtype_keyword(s))
            .map(|s| s.to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        let lookup_table_name = strings
            .iter()
            .find(|s| lookups.contains_table(s))
            .cloned();

        Some(Declaration {
            metric_id,
            kind: DeclarationKind::classify(&name),
            name,
            dtype,
            lookup_table_name,
        })
    }

    /// Text scan for `identifier.with.dots` followed by a `0x10` tag and a varint id
    fn parse_fallback(&self, buf: &[u8]) -> DeclarationSet {
        let mut set = DeclarationSet::default();
        let Some(pattern) = fallback_pattern() else {
            return set;
        };
        let mut seen = HashSet::new();

        for caps in pattern.captures_iter(buf) {
            let (Some(whole), Some(raw_name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !raw_name.as_bytes().contains(&b'.') {
                continue;
            }
            // The class is ASCII-only, so the name is valid UTF-8
            let name = String::from_utf8_lossy(raw_name.as_bytes())
                .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                .to_string();
            if name.is_empty() || seen.contains(&name) {
                continue;
            }
            let Some((metric_id, _)) = read_varint(buf, whole.end()) else {
                continue;
            };
            if metric_id == 0 {
                continue;
            }

            let inserted = set.insert(Declaration {
                metric_id,
                kind: DeclarationKind::classify(&name),
                name: name.clone(),
                dtype: "unknown".to_string(),
                lookup_table_name: None,
            });
            if inserted {
                seen.insert(name);
            }
        }

        set
    }
}
