//! Error type definitions for the TRP decoder
//!
//! Only archive-level and whole-file failures surface as errors. Anything that goes
//! wrong inside a single record or field is absorbed where it happens and at most shows
//! up as a warning in the import report.

use std::path::PathBuf;
use thiserror::Error;

use sandboxed_archive::SandboxedArchiveError;

/// Fatal decode errors
///
/// Every variant aborts the import. Callers at an API boundary should map these to a
/// hard failure, distinct from the soft "decoded nothing" outcome.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The archive could not be extracted safely (zip-slip, bad container, size limit)
    #[error("Archive error: {0}")]
    Archive(#[from] SandboxedArchiveError),

    /// None of the known archive layouts were found under the extraction root
    #[error("Unrecognised archive layout under {root:?}: {message}")]
    MissingLayout { root: PathBuf, message: String },

    /// A compression header was found but every inflate strategy failed
    #[error("Decompression failed for {context}: {source}")]
    Decompression {
        context: String,
        #[source]
        source: DecompressionError,
    },

    /// Reading an extracted file failed
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration values
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Failure of the compression sniffer on a single buffer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecompressionError {
    /// A deflate header was detected at `offset`, but neither zlib nor raw deflate produced
    /// acceptable output
    #[error("found zlib header at offset {offset} but decompression failed: {}", attempts.join("; "))]
    HeaderWithoutPayload { offset: usize, attempts: Vec<String> },
}

impl DecodeError {
    /// Create a missing layout error
    pub fn missing_layout<P: Into<PathBuf>, S: Into<String>>(root: P, message: S) -> Self {
        Self::MissingLayout {
            root: root.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap a decompression failure with the file it happened on
    pub fn decompression<S: Into<String>>(context: S, source: DecompressionError) -> Self {
        Self::Decompression {
            context: context.into(),
            source,
        }
    }

    /// Create an I/O error for a path
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure was caused by an unsafe archive member path
    pub fn is_unsafe_path(&self) -> bool {
        matches!(self, Self::Archive(e) if e.is_path_violation())
    }
}
