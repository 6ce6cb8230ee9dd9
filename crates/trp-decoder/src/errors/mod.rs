//! Centralized error handling for the TRP decoder
//!
//! # Error Categories
//!
//! - **Structural errors** ([`DecodeError`]): unsafe archive member paths, unknown archive
//!   layouts, compressed payloads that fail every inflate strategy. These abort an import.
//! - **Partial decode warnings**: missing optional files, a provider channel that cannot be
//!   read, dictionaries that parse to nothing. These are strings in
//!   `ImportReport::warnings`, never errors.
//! - **Heuristic misses**: declared metrics with no samples, KPI types with no candidate.
//!   These are data (`KpiSelection::missing_data`, `ImportReport::unknown_frames`).
//!
//! # Usage
//!
//! ```rust
//! use trp_decoder::errors::{DecodeError, TrpResult};
//!
//! fn example_function() -> TrpResult<()> {
//!     Err(DecodeError::configuration("max_record_len must be positive"))
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using DecodeError
pub type TrpResult<T> = Result<T, DecodeError>;
