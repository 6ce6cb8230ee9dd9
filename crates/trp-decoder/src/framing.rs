//! Record framing for raw channel streams
//!
//! `channel.log` is a concatenation of length-prefixed records, but recorder versions
//! disagree on the prefix. Two strategies are probed on the head of the stream and the
//! one that frames more records cleanly wins.

use tracing::debug;

use crate::config::LimitsConfig;
use crate::wire::read_varint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStrategy {
    /// Varint length prefix
    VarintLen,
    /// Little-endian `u32` length prefix
    U32Len,
}

impl FrameStrategy {
    pub const ALL: [FrameStrategy; 2] = [FrameStrategy::VarintLen, FrameStrategy::U32Len];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VarintLen => "varint_len",
            Self::U32Len => "u32_len",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::VarintLen => Self::U32Len,
            Self::U32Len => Self::VarintLen,
        }
    }

    /// Try to read one record at `offset`. Empty or oversized records do not count.
    pub fn parse_at<'a>(
        &self,
        data: &'a [u8],
        offset: usize,
        max_record_len: usize,
    ) -> Option<Frame<'a>> {
        let (len, start) = match self {
            Self::VarintLen => {
                let (len, start) = read_varint(data, offset)?;
                (usize::try_from(len).ok()?, start)
            }
            Self::U32Len => {
                let prefix: [u8; 4] = data.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
                (u32::from_le_bytes(prefix) as usize, offset + 4)
            }
        };
        if len == 0 || len > max_record_len {
            return None;
        }
        let end = start.checked_add(len)?;
        let payload = data.get(start..end)?;
        Some(Frame {
            payload,
            next_offset: end,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub payload: &'a [u8],
    pub next_offset: usize,
}

/// Outcome of framing a whole stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameScan {
    pub strategy: FrameStrategy,
    pub frames: usize,
}

/// Chooses a framing strategy and walks streams with it under the configured bounds
#[derive(Debug, Clone)]
pub struct FrameSelector {
    max_record_len: usize,
    probe_records: usize,
    probe_fail_limit: usize,
    max_frame_scan: usize,
    max_fail_streak: usize,
}

impl Default for FrameSelector {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default())
    }
}

impl FrameSelector {
    pub fn from_config(limits: &LimitsConfig) -> Self {
        Self {
            max_record_len: limits.max_record_len,
            probe_records: limits.probe_records,
            probe_fail_limit: limits.probe_fail_limit,
            max_frame_scan: limits.max_frame_scan,
            max_fail_streak: limits.max_fail_streak,
        }
    }

    /// Successes minus failures over the first few attempts
    pub fn probe_score(&self, strategy: FrameStrategy, data: &[u8]) -> i64 {
        let mut offset = 0;
        let mut ok = 0i64;
        let mut failed = 0usize;

        for _ in 0..self.probe_records {
            if offset >= data.len() {
                break;
            }
            match strategy.parse_at(data, offset, self.max_record_len) {
                Some(frame) => {
                    ok += 1;
                    offset = frame.next_offset;
                }
                None => {
                    failed += 1;
                    offset += 1;
                    if failed > self.probe_fail_limit {
                        break;
                    }
                }
            }
        }

        ok - failed as i64
    }

    /// Highest probe score wins; ties keep the varint strategy
    pub fn select(&self, data: &[u8]) -> FrameStrategy {
        let mut best = FrameStrategy::VarintLen;
        let mut best_score = i64::MIN;
        for strategy in FrameStrategy::ALL {
            let score = self.probe_score(strategy, data);
            debug!("frame probe {}: score {}", strategy.as_str(), score);
            if score > best_score {
                best_score = score;
                best = strategy;
            }
        }
        best
    }

    pub fn frames<'a>(&self, strategy: FrameStrategy, data: &'a [u8]) -> Frames<'a> {
        Frames {
            data,
            strategy,
            offset: 0,
            frames: 0,
            fail_streak: 0,
            max_record_len: self.max_record_len,
            max_frame_scan: self.max_frame_scan,
            max_fail_streak: self.max_fail_streak,
        }
    }

    /// Frame `data` with the selected strategy, retrying once with the other strategy when
    /// the first one yields nothing. `on_frame` receives every record payload.
    pub fn scan<F>(&self, data: &[u8], mut on_frame: F) -> FrameScan
    where
        F: FnMut(&[u8]),
    {
        let strategy = self.select(data);
        let frames = self.run(strategy, data, &mut on_frame);
        if frames > 0 || data.is_empty() {
            return FrameScan { strategy, frames };
        }

        let alternate = strategy.other();
        debug!(
            "{} framed nothing, retrying with {}",
            strategy.as_str(),
            alternate.as_str()
        );
        let frames = self.run(alternate, data, &mut on_frame);
        if frames > 0 {
            FrameScan {
                strategy: alternate,
                frames,
            }
        } else {
            FrameScan { strategy, frames }
        }
    }

    fn run<F>(&self, strategy: FrameStrategy, data: &[u8], on_frame: &mut F) -> usize
    where
        F: FnMut(&[u8]),
    {
        let mut frames = self.frames(strategy, data);
        for payload in frames.by_ref() {
            on_frame(payload);
        }
        frames.count_so_far()
    }
}

/// Iterator over record payloads in a stream
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    data: &'a [u8],
    strategy: FrameStrategy,
    offset: usize,
    frames: usize,
    fail_streak: usize,
    max_record_len: usize,
    max_frame_scan: usize,
    max_fail_streak: usize,
}

impl Frames<'_> {
    pub fn count_so_far(&self) -> usize {
        self.frames
    }
}

impl<'a> Iterator for Frames<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        while self.offset < self.data.len() && self.frames < self.max_frame_scan {
            match self
                .strategy
                .parse_at(self.data, self.offset, self.max_record_len)
            {
                Some(frame) => {
                    self.fail_streak = 0;
                    self.offset = frame.next_offset;
                    self.frames += 1;
                    return Some(frame.payload);
                }
                None => {
                    self.offset += 1;
                    self.fail_streak += 1;
                    if self.fail_streak > self.max_fail_streak {
                        debug!(
                            "abandoning {} stream at offset {} after {} failures",
                            self.strategy.as_str(),
                            self.offset,
                            self.fail_streak
                        );
                        self.offset = self.data.len();
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_varint;
    use proptest::prelude::*;

    fn varint_framed(records: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for record in records {
            encode_varint(record.len() as u64, &mut out);
            out.extend_from_slice(record);
        }
        out
    }

    fn u32_framed(records: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for record in records {
            out.extend_from_slice(&(record.len() as u32).to_le_bytes());
            out.extend_from_slice(record);
        }
        out
    }

    #[test]
    fn test_selects_u32_for_u32_stream() {
        let records: Vec<&[u8]> = vec![&b"\x08\x01\x10\x02"[..], &b"\x08\x03\x10\x04\x18\x05"[..]];
        let data = u32_framed(&records);
        let selector = FrameSelector::default();
        assert_eq!(selector.select(&data), FrameStrategy::U32Len);

        let payloads: Vec<_> = selector.frames(FrameStrategy::U32Len, &data).collect();
        assert_eq!(payloads, records);
    }

    #[test]
    fn test_selects_varint_for_varint_stream() {
        let records: Vec<&[u8]> = vec![&b"\x08\x01\x10\x02"[..]; 10];
        let data = varint_framed(&records);
        let selector = FrameSelector::default();
        assert_eq!(selector.select(&data), FrameStrategy::VarintLen);

        let scan = selector.scan(&data, |_| {});
        assert_eq!(scan.frames, 10);
        assert_eq!(scan.strategy, FrameStrategy::VarintLen);
    }

    #[test]
    fn test_zero_length_records_are_failures() {
        let selector = FrameSelector::default();
        assert!(FrameStrategy::VarintLen.parse_at(&[0x00, 0x01], 0, 10).is_none());
        assert!(
            FrameStrategy::U32Len
                .parse_at(&[0, 0, 0, 0, 1], 0, 10)
                .is_none()
        );
        assert_eq!(selector.frames(FrameStrategy::VarintLen, &[0, 0, 0]).count(), 0);
    }

    #[test]
    fn test_oversized_records_rejected() {
        let mut data = Vec::new();
        encode_varint(300, &mut data);
        data.extend(vec![1u8; 300]);
        assert!(FrameStrategy::VarintLen.parse_at(&data, 0, 256).is_none());
        assert!(FrameStrategy::VarintLen.parse_at(&data, 0, 300).is_some());
    }

    #[test]
    fn test_fail_streak_abandons_stream() {
        let limits = LimitsConfig {
            max_fail_streak: 4,
            ..LimitsConfig::default()
        };
        let selector = FrameSelector::from_config(&limits);
        // Six unframeable bytes (lengths past the end), then a valid record
        let mut data = vec![0x7F; 6];
        data.extend(varint_framed(&[&b"\x08\x01"[..]]));
        assert_eq!(selector.frames(FrameStrategy::VarintLen, &data).count(), 0);
    }

    #[test]
    fn test_frame_scan_cap() {
        let limits = LimitsConfig {
            max_frame_scan: 3,
            ..LimitsConfig::default()
        };
        let selector = FrameSelector::from_config(&limits);
        let data = varint_framed(&[&b"\x08\x01"[..]; 10]);
        assert_eq!(selector.frames(FrameStrategy::VarintLen, &data).count(), 3);
    }

    proptest! {
        #[test]
        fn garbage_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let selector = FrameSelector::default();
            let mut seen = 0usize;
            let scan = selector.scan(&bytes, |payload| {
                assert!(!payload.is_empty());
                seen += 1;
            });
            prop_assert_eq!(scan.frames, seen);
        }
    }
}
