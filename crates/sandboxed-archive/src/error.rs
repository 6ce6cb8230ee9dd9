//! Error types for sandboxed archive extraction.

use std::path::PathBuf;

/// Result type for sandboxed archive operations.
pub type Result<T> = std::result::Result<T, SandboxedArchiveError>;

/// Errors that can occur while extracting an archive into a sandbox.
#[derive(Debug, thiserror::Error)]
pub enum SandboxedArchiveError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry path validation failed - potential zip-slip
    #[error("Path validation failed: {path:?} - {reason}")]
    PathValidation { path: PathBuf, reason: String },

    /// Input is recognisably something other than a zip archive
    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    /// The zip container itself could not be read
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Uncompressed output exceeded the configured ceiling
    #[error("Size limit exceeded: {written} bytes written (max: {limit})")]
    SizeLimit { written: u64, limit: u64 },

    /// Directory creation failed
    #[error("Failed to create directory: {path:?} - {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl SandboxedArchiveError {
    /// True when the error is a sandbox escape attempt rather than an I/O or format issue.
    #[must_use]
    pub const fn is_path_violation(&self) -> bool {
        matches!(self, Self::PathValidation { .. })
    }
}
