use flate2::{Decompress, FlushDecompress, Status};
use tracing::debug;

use crate::config::HeuristicsConfig;
use crate::errors::DecompressionError;

/// How a buffer was unpacked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Zlib,
    RawDeflate,
    Plain,
}

impl CompressionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zlib => "zlib",
            Self::RawDeflate => "rawdeflate",
            Self::Plain => "plain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    pub data: Vec<u8>,
    pub method: CompressionMethod,
    /// Offset of the detected zlib header, 0 when none was found
    pub offset: usize,
}

/// Deflate-family sniffer tolerant of junk before the stream header
#[derive(Debug, Clone)]
pub struct CompressionSniffer {
    header_scan_window: usize,
    raw_deflate_min_ratio: f64,
}

/// Raw deflate output shorter than this is never believed
const MIN_RAW_DEFLATE_OUTPUT: usize = 8;

impl Default for CompressionSniffer {
    fn default() -> Self {
        Self::from_config(&HeuristicsConfig::default())
    }
}

impl CompressionSniffer {
    pub fn from_config(config: &HeuristicsConfig) -> Self {
        Self {
            header_scan_window: config.header_scan_window,
            raw_deflate_min_ratio: config.raw_deflate_min_ratio,
        }
    }

    /// Locate a zlib header (`0x78` then `0x01`, `0x9C` or `0xDA`) within the scan window
    pub fn find_zlib_header(&self, data: &[u8]) -> Option<usize> {
        let limit = data.len().saturating_sub(1).min(self.header_scan_window);
        (0..limit).find(|&i| data[i] == 0x78 && matches!(data[i + 1], 0x01 | 0x9C | 0xDA))
    }

    /// Remove zlib or raw-deflate compression if present.
    ///
    /// A detected header whose stream fails both inflate strategies is an error; a buffer
    /// with no header that does not raw-inflate convincingly is returned as-is.
    pub fn decompress(&self, data: &[u8]) -> Result<Decompressed, DecompressionError> {
        if data.is_empty() {
            return Ok(Decompressed {
                data: Vec::new(),
                method: CompressionMethod::Plain,
                offset: 0,
            });
        }

        let header = self.find_zlib_header(data);
        let offset = header.unwrap_or(0);
        let payload = &data[offset..];
        let mut attempts = Vec::new();

        if header.is_some() {
            match inflate(payload, true) {
                Ok(out) => {
                    debug!(
                        "zlib stream at offset {}: {} -> {} bytes",
                        offset,
                        payload.len(),
                        out.len()
                    );
                    return Ok(Decompressed {
                        data: out,
                        method: CompressionMethod::Zlib,
                        offset,
                    });
                }
                Err(e) => attempts.push(format!("zlib:{e}")),
            }
        }

        match inflate(payload, false) {
            Ok(out) if out.len() >= self.min_raw_output(payload.len()) => {
                debug!("raw deflate stream: {} -> {} bytes", payload.len(), out.len());
                return Ok(Decompressed {
                    data: out,
                    method: CompressionMethod::RawDeflate,
                    offset,
                });
            }
            Ok(out) => attempts.push(format!("rawdeflate:output_too_small({})", out.len())),
            Err(e) => attempts.push(format!("rawdeflate:{e}")),
        }

        if header.is_some() {
            return Err(DecompressionError::HeaderWithoutPayload { offset, attempts });
        }

        Ok(Decompressed {
            data: data.to_vec(),
            method: CompressionMethod::Plain,
            offset: 0,
        })
    }

    fn min_raw_output(&self, input_len: usize) -> usize {
        let ratio_floor = (input_len as f64 * self.raw_deflate_min_ratio) as usize;
        ratio_floor.max(MIN_RAW_DEFLATE_OUTPUT)
    }
}

/// Inflate a complete stream; a stream that ends before its final block is an error
fn inflate(input: &[u8], zlib_header: bool) -> Result<Vec<u8>, String> {
    let mut decoder = Decompress::new(zlib_header);
    let mut out = Vec::with_capacity(input.len().clamp(64, 1 << 20));

    loop {
        let before_in = decoder.total_in();
        let before_out = decoder.total_out();
        let consumed = usize::try_from(before_in).map_err(|e| e.to_string())?;
        let status = decoder
            .decompress_vec(&input[consumed..], &mut out, FlushDecompress::Finish)
            .map_err(|e| e.to_string())?;

        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                if out.len() == out.capacity() {
                    out.reserve(out.capacity());
                } else if decoder.total_in() == before_in && decoder.total_out() == before_out {
                    return Err("truncated stream".to_string());
                }
            }
        }
    }
}
