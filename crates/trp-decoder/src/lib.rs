//! # TRP decoder
//!
//! Decodes TRP drive-test recordings (zip archives of provider CDF files or raw
//! `channel.log` streams plus a GPS track) into KPI samples, signalling events, track
//! points, per-metric catalogs and a canonical KPI selection.
//!
//! ```rust,no_run
//! use trp_decoder::{config::Config, decoder::import_archive};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let result = import_archive("drive-test.trp".as_ref(), None, &config)?;
//! println!("{} samples", result.kpi_samples.len());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod decoder;
pub mod dictionary;
pub mod errors;
pub mod framing;
pub mod ingestor;
pub mod kpi;
pub mod models;
pub mod record;
pub mod runner;
pub mod store;
pub mod utils;
pub mod wire;

pub use decoder::{decode, import_archive};
pub use errors::{DecodeError, TrpResult};
