//! Byte, text and time helpers shared by the decoding layers

pub mod decompression;
pub mod text;
pub mod time;

pub use decompression::{CompressionMethod, CompressionSniffer, Decompressed};
