//! Decoding of a single framed record

use chrono::{DateTime, Utc};

use crate::config::{HeuristicsConfig, IdPriority};
use crate::dictionary::DeclarationSet;
use crate::models::{EventParam, ParamType, ParamValue};
use crate::utils::time::{datetime_from_epoch, is_plausible_epoch};
use crate::wire::{FieldIter, WireValue};

/// Fields read from one record
const MAX_RECORD_FIELDS: usize = 200;

/// Typed view of one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRecord {
    /// `(field number, value)` for every varint, in order
    pub varints: Vec<(u64, u64)>,
    pub timestamp: Option<DateTime<Utc>>,
    pub msg_id: Option<u64>,
    /// First finite float in the record
    pub float_value: Option<f64>,
    /// Float value, or the varint fallback when the record has neither float nor text
    pub value_num: Option<f64>,
    pub value_str: Option<String>,
    pub params: Vec<EventParam>,
}

impl DecodedRecord {
    /// First varint that is a declared metric id, else the positional guess
    pub fn resolve_id(&self, declarations: &DeclarationSet) -> Option<u64> {
        if !declarations.is_empty()
            && let Some(&(_, id)) = self
                .varints
                .iter()
                .find(|(_, v)| declarations.contains_id(*v))
        {
            return Some(id);
        }
        self.msg_id
    }

    /// Numeric value of the record when `id` is its message id.
    ///
    /// Uses the float field when present, otherwise the last varint that is neither the
    /// id nor an epoch timestamp.
    pub fn numeric_value(&self, id: Option<u64>) -> Option<f64> {
        self.float_value.or_else(|| self.varint_fallback(id))
    }

    fn varint_fallback(&self, id: Option<u64>) -> Option<f64> {
        self.varints
            .iter()
            .rev()
            .map(|(_, v)| *v)
            .find(|v| Some(*v) != id && !is_plausible_epoch(*v))
            .map(|v| v as f64)
    }
}

/// Record decoder configured with the text and id heuristics
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    min_printable_ratio: f64,
    id_priority: IdPriority,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::from_config(&HeuristicsConfig::default())
    }
}

impl RecordDecoder {
    pub fn from_config(config: &HeuristicsConfig) -> Self {
        Self {
            min_printable_ratio: config.min_printable_ratio,
            id_priority: config.id_priority,
        }
    }

    pub fn decode(&self, record: &[u8]) -> DecodedRecord {
        let mut out = DecodedRecord::default();

        for field in FieldIter::with_max_fields(record, MAX_RECORD_FIELDS) {
            let param_id = field.number;
            match field.value {
                WireValue::Varint(v) => {
                    out.varints.push((param_id, v));
                    out.params.push(EventParam {
                        param_id,
                        param_value: Some(ParamValue::Integer(v)),
                        param_type: ParamType::Varint,
                    });
                    if out.timestamp.is_none() && is_plausible_epoch(v) {
                        out.timestamp = datetime_from_epoch(v, 0);
                    }
                }
                WireValue::Fixed32(_) | WireValue::Fixed64(_) => {
                    let (value, param_type) = match field.value.as_f32() {
                        Some(f) => (f64::from(f), ParamType::Float32),
                        None => (field.value.as_f64().unwrap_or(f64::NAN), ParamType::Float64),
                    };
                    let finite = value.is_finite().then_some(value);
                    if out.float_value.is_none() {
                        out.float_value = finite;
                    }
                    out.params.push(EventParam {
                        param_id,
                        param_value: finite.map(ParamValue::Float),
                        param_type,
                    });
                }
                WireValue::LengthDelimited(bytes) => {
                    let param = match field.value.as_text(self.min_printable_ratio) {
                        Some(text) => {
                            if out.value_str.is_none() {
                                out.value_str = Some(text.clone());
                            }
                            EventParam {
                                param_id,
                                param_value: Some(ParamValue::Text(text)),
                                param_type: ParamType::String,
                            }
                        }
                        None => EventParam {
                            param_id,
                            param_value: Some(ParamValue::Text(format!("bytes[{}]", bytes.len()))),
                            param_type: ParamType::Bytes,
                        },
                    };
                    out.params.push(param);
                }
            }
        }

        out.msg_id = match (self.id_priority, out.varints.as_slice()) {
            (_, []) => None,
            (IdPriority::SecondVarint, [_, (_, second), ..]) if *second > 0 => Some(*second),
            (_, [(_, first), ..]) => Some(*first),
        };

        out.value_num = match (out.float_value, &out.value_str) {
            (Some(v), _) => Some(v),
            (None, None) => out.varint_fallback(out.msg_id),
            (None, Some(_)) => None,
        };

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::{DeclarationParser, LookupTables};
    use crate::utils::time::format_timestamp;
    use crate::wire::test_support::*;

    const EPOCH: u64 = 1_733_530_000;

    #[test]
    fn test_second_varint_is_id_and_epoch_is_timestamp() {
        let mut record = field_varint(1, EPOCH);
        record.extend(field_varint(2, 1001));
        record.extend(field_varint(3, 95));

        let decoded = RecordDecoder::default().decode(&record);
        assert_eq!(decoded.msg_id, Some(1001));
        assert_eq!(
            decoded.timestamp.map(format_timestamp).as_deref(),
            Some("2024-12-07T00:06:40.000Z")
        );
        assert_eq!(decoded.value_num, Some(95.0));
        assert_eq!(decoded.params.len(), 3);
    }

    #[test]
    fn test_first_varint_priority() {
        let mut record = field_varint(1, 7);
        record.extend(field_varint(2, 9));
        let config = HeuristicsConfig {
            id_priority: IdPriority::FirstVarint,
            ..HeuristicsConfig::default()
        };
        let decoded = RecordDecoder::from_config(&config).decode(&record);
        assert_eq!(decoded.msg_id, Some(7));
    }

    #[test]
    fn test_zero_second_varint_keeps_first() {
        let mut record = field_varint(1, 7);
        record.extend(field_varint(2, 0));
        assert_eq!(RecordDecoder::default().decode(&record).msg_id, Some(7));
    }

    #[test]
    fn test_float_and_string_fields() {
        let mut record = field_varint(1, 5);
        record.extend(field_f32(2, -92.5));
        record.extend(field_bytes(3, b"Connected"));
        record.extend(field_bytes(4, &[0x01, 0x02, 0x03]));

        let decoded = RecordDecoder::default().decode(&record);
        assert_eq!(decoded.value_num, Some(-92.5));
        assert_eq!(decoded.value_str.as_deref(), Some("Connected"));
        let bytes_param = decoded.params.last().unwrap();
        assert_eq!(bytes_param.param_type, ParamType::Bytes);
        assert_eq!(
            bytes_param.param_value,
            Some(ParamValue::Text("bytes[3]".to_string()))
        );
    }

    #[test]
    fn test_non_finite_float_is_absent() {
        let mut record = field_varint(1, 5);
        record.extend(field_f64(2, f64::NAN));
        record.extend(field_f64(3, 12.5));

        let decoded = RecordDecoder::default().decode(&record);
        assert_eq!(decoded.float_value, Some(12.5));
        assert_eq!(decoded.params[1].param_value, None);
    }

    #[test]
    fn test_declared_id_overrides_position() {
        let mut decl = field_varint(1, 42);
        decl.extend(field_bytes(2, b"Radio.Lte.ServingCell.Rsrq"));
        let declarations =
            DeclarationParser::new(0.75).parse(&field_bytes(1, &decl), &LookupTables::default());

        let mut record = field_varint(1, 42);
        record.extend(field_varint(2, 3));
        record.extend(field_varint(3, 11));

        let decoded = RecordDecoder::default().decode(&record);
        assert_eq!(decoded.msg_id, Some(3));
        let id = decoded.resolve_id(&declarations);
        assert_eq!(id, Some(42));
        assert_eq!(decoded.numeric_value(id), Some(11.0));
    }

    #[test]
    fn test_fallback_skips_id_and_epoch() {
        let mut record = field_varint(1, EPOCH);
        record.extend(field_varint(2, 1002));
        record.extend(field_bytes(4, b"DIAL_START"));

        let decoded = RecordDecoder::default().decode(&record);
        assert_eq!(decoded.value_num, None);
        assert_eq!(decoded.numeric_value(Some(1002)), None);
    }
}
