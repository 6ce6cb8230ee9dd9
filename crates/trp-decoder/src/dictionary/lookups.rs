//! Enum lookup tables (`lookuptables.bin` / `lookuptables.cdf`)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::wire::{FieldIter, WireValue};

/// Fields scanned per table record
const MAX_TABLE_FIELDS: usize = 500;
/// Fields scanned per enum entry
const MAX_ENTRY_FIELDS: usize = 50;
/// Longest string accepted as a table name
const MAX_TABLE_NAME_CHARS: usize = 120;

/// `tableName -> (enumValue -> label)`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupTables {
    tables: BTreeMap<String, BTreeMap<u64, String>>,
}

impl LookupTables {
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table(&self, name: &str) -> Option<&BTreeMap<u64, String>> {
        self.tables.get(name)
    }

    /// Label for a numeric value, when the value is a non-negative integer present in `table`
    pub fn label(&self, table: &str, value: f64) -> Option<&str> {
        if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
            return None;
        }
        self.tables
            .get(table)?
            .get(&(value as u64))
            .map(String::as_str)
    }

    pub fn insert(&mut self, name: String, entries: BTreeMap<u64, String>) {
        self.tables.entry(name).or_insert(entries);
    }

    /// Add tables from another provider; a table name seen earlier keeps its entries
    pub fn merge(&mut self, other: LookupTables) {
        for (name, entries) in other.tables {
            self.insert(name, entries);
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

/// Structured parser for lookup table buffers
#[derive(Debug, Clone)]
pub struct LookupParser {
    min_printable_ratio: f64,
}

impl LookupParser {
    pub fn new(min_printable_ratio: f64) -> Self {
        Self {
            min_printable_ratio,
        }
    }

    pub fn parse(&self, buf: &[u8]) -> LookupTables {
        let mut out = LookupTables::default();

        for field in FieldIter::new(buf) {
            let WireValue::LengthDelimited(record) = field.value else {
                continue;
            };
            let mut table_name = None;
            let mut entries = BTreeMap::new();

            for nested in FieldIter::with_max_fields(record, MAX_TABLE_FIELDS) {
                let WireValue::LengthDelimited(inner) = nested.value else {
                    continue;
                };
                if let Some((value, label)) = self.parse_entry(inner) {
                    entries.entry(value).or_insert(label);
                    continue;
                }
                if table_name.is_none()
                    && let Some(text) = nested.value.as_text(self.min_printable_ratio)
                    && text.chars().count() < MAX_TABLE_NAME_CHARS
                {
                    table_name = Some(text);
                }
            }

            if let Some(name) = table_name
                && !entries.is_empty()
            {
                out.insert(name, entries);
            }
        }

        debug!("Parsed {} lookup tables", out.len());
        out
    }

    /// A cleanly framed sub-message holding one integer and one string
    fn parse_entry(&self, buf: &[u8]) -> Option<(u64, String)> {
        let mut iter = FieldIter::with_max_fields(buf, MAX_ENTRY_FIELDS);
        let mut value = None;
        let mut label = None;

        for field in iter.by_ref() {
            match field.value {
                WireValue::Varint(v) if value.is_none() => value = Some(v),
                WireValue::LengthDelimited(_) if label.is_none() => {
                    label = field.value.as_text(self.min_printable_ratio);
                }
                _ => {}
            }
        }

        if !iter.is_exhausted() {
            return None;
        }
        Some((value?, label?))
    }
}
