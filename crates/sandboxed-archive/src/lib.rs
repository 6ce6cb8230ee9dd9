//! # Sandboxed Archive
//!
//! Zip extraction that cannot write outside of a chosen base directory.
//!
//! Uploaded archives are untrusted input. A member named `../../etc/cron.d/job` or
//! `/etc/passwd` ("zip-slip") would otherwise let an archive overwrite arbitrary files.
//! This crate validates every member name before anything is written and refuses the
//! whole archive if a single member would escape.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use sandboxed_archive::SandboxedExtractor;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = SandboxedExtractor::builder()
//!     .base_directory("/var/tmp/trp-import-1")
//!     .max_total_bytes(2 * 1024 * 1024 * 1024)
//!     .build()?;
//!
//! let summary = extractor.extract("/uploads/drive-test.trp")?;
//! println!("{} files extracted", summary.files.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Features
//!
//! - **Two-phase extraction**: all member names are validated before the first write
//! - **Lexical normalization**: `.`/`..` resolved, backslashes treated as separators
//! - **Absolute path rejection**: leading `/`, `\` and drive prefixes (`C:`) are refused
//! - **Canonical containment check**: each target's resolved parent must lie inside the base
//! - **Magic number sniffing**: inputs identified as another format are refused (via `infer`)
//! - **Size ceiling**: total uncompressed bytes are capped
//!
//! ## Path Resolution Examples
//!
//! Given sandbox base: `/var/tmp/trp`
//!
//! **✅ Allowed members:**
//! - `trp/channel.log`
//! - `trp/providers/sp1/cdf/data.cdf`
//! - `trp/tmp/../declarations.bin` (resolves to `trp/declarations.bin`)
//!
//! **❌ Refused members:**
//! - `../evil.txt`
//! - `/etc/passwd`
//! - `C:\Windows\evil.dll`

pub mod error;
pub mod extractor;
pub mod security;

pub use error::{Result, SandboxedArchiveError};
pub use extractor::{
    DEFAULT_MAX_TOTAL_BYTES, ExtractionSummary, SandboxedExtractor, SandboxedExtractorBuilder,
};
pub use security::{normalize_directory_name, normalize_entry_name};
