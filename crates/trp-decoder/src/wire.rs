//! Protobuf-like wire reader
//!
//! TRP payloads use protobuf framing without a published schema, so this reader never
//! fails loudly: a malformed key, a truncated value or an unsupported wire type simply
//! ends the scan. Callers that need to know whether a buffer was a clean message
//! check [`FieldIter::is_exhausted`] after iterating.

use crate::utils::text::decode_text;

/// Maximum continuation groups in a varint (64 bits / 7 bits per group, rounded up)
const MAX_VARINT_GROUPS: usize = 10;

/// Default field cap for a single [`FieldIter`]
pub const DEFAULT_MAX_FIELDS: usize = 100_000;

/// Read a base-128 varint starting at `pos`.
///
/// Returns the value and the position just past it, or `None` when the buffer ends
/// before a terminating byte or no terminator appears within ten groups.
pub fn read_varint(buf: &[u8], pos: usize) -> Option<(u64, usize)> {
    let mut result = 0u64;
    let mut pos = pos;

    for group in 0..MAX_VARINT_GROUPS {
        let byte = *buf.get(pos)?;
        pos += 1;
        // The tenth group only contributes its lowest bit.
        result |= u64::from(byte & 0x7F) << (group * 7);
        if byte & 0x80 == 0 {
            return Some((result, pos));
        }
    }

    None
}

/// Append `value` as a base-128 varint.
pub fn encode_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// ZigZag decode: 0 → 0, 1 → -1, 2 → 1, 3 → -2, ...
pub fn decode_zigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Wire types understood by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    pub fn from_key(key: u64) -> Option<Self> {
        match key & 0x07 {
            0 => Some(Self::Varint),
            1 => Some(Self::Fixed64),
            2 => Some(Self::LengthDelimited),
            5 => Some(Self::Fixed32),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
        }
    }
}

/// A decoded field value borrowing from the scanned buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireValue<'a> {
    Varint(u64),
    Fixed64([u8; 8]),
    LengthDelimited(&'a [u8]),
    Fixed32([u8; 4]),
}

impl<'a> WireValue<'a> {
    pub fn wire_type(&self) -> WireType {
        match self {
            Self::Varint(_) => WireType::Varint,
            Self::Fixed64(_) => WireType::Fixed64,
            Self::LengthDelimited(_) => WireType::LengthDelimited,
            Self::Fixed32(_) => WireType::Fixed32,
        }
    }

    pub fn as_varint(&self) -> Option<u64> {
        match self {
            Self::Varint(v) => Some(*v),
            _ => None,
        }
    }

    /// Little-endian IEEE-754 single
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Fixed32(bytes) => Some(f32::from_le_bytes(*bytes)),
            _ => None,
        }
    }

    /// Little-endian IEEE-754 double
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Fixed64(bytes) => Some(f64::from_le_bytes(*bytes)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Self::LengthDelimited(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Length-delimited payload as text, when it passes the printable check
    pub fn as_text(&self, min_printable_ratio: f64) -> Option<String> {
        self.as_bytes()
            .and_then(|bytes| decode_text(bytes, min_printable_ratio))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WireField<'a> {
    pub number: u64,
    pub value: WireValue<'a>,
}

/// Lazy field scanner over a byte slice
#[derive(Debug, Clone)]
pub struct FieldIter<'a> {
    buf: &'a [u8],
    pos: usize,
    remaining: usize,
    stopped: bool,
}

impl<'a> FieldIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_max_fields(buf, DEFAULT_MAX_FIELDS)
    }

    /// Scanner that yields at most `max_fields` fields
    pub fn with_max_fields(buf: &'a [u8], max_fields: usize) -> Self {
        Self {
            buf,
            pos: 0,
            remaining: max_fields,
            stopped: false,
        }
    }

    /// Byte offset of the next unread field
    pub fn position(&self) -> usize {
        self.pos
    }

    /// True once the scan has consumed the whole buffer without hitting malformed input.
    ///
    /// Only meaningful after the iterator has returned `None`.
    pub fn is_exhausted(&self) -> bool {
        !self.stopped && self.pos == self.buf.len()
    }

    fn stop(&mut self) -> Option<WireField<'a>> {
        self.stopped = true;
        None
    }

    fn take<const N: usize>(&mut self, start: usize) -> Option<[u8; N]> {
        let end = start.checked_add(N)?;
        let bytes: [u8; N] = self.buf.get(start..end)?.try_into().ok()?;
        self.pos = end;
        Some(bytes)
    }
}

impl<'a> Iterator for FieldIter<'a> {
    type Item = WireField<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped || self.pos >= self.buf.len() {
            return None;
        }
        if self.remaining == 0 {
            // Cap reached with bytes left: not a clean, fully-read message
            return self.stop();
        }

        let Some((key, after_key)) = read_varint(self.buf, self.pos) else {
            return self.stop();
        };
        let number = key >> 3;
        let Some(wire_type) = WireType::from_key(key) else {
            return self.stop();
        };

        let value = match wire_type {
            WireType::Varint => match read_varint(self.buf, after_key) {
                Some((v, next)) => {
                    self.pos = next;
                    WireValue::Varint(v)
                }
                None => return self.stop(),
            },
            WireType::Fixed64 => match self.take::<8>(after_key) {
                Some(bytes) => WireValue::Fixed64(bytes),
                None => return self.stop(),
            },
            WireType::Fixed32 => match self.take::<4>(after_key) {
                Some(bytes) => WireValue::Fixed32(bytes),
                None => return self.stop(),
            },
            WireType::LengthDelimited => {
                let Some((len, start)) = read_varint(self.buf, after_key) else {
                    return self.stop();
                };
                let end = usize::try_from(len)
                    .ok()
                    .and_then(|len| start.checked_add(len))
                    .filter(|end| *end <= self.buf.len());
                match end {
                    Some(end) => {
                        self.pos = end;
                        WireValue::LengthDelimited(&self.buf[start..end])
                    }
                    None => return self.stop(),
                }
            }
        };

        self.remaining -= 1;
        Some(WireField { number, value })
    }
}

/// Scan `buf` with the default field cap
pub fn fields(buf: &[u8]) -> FieldIter<'_> {
    FieldIter::new(buf)
}
