//! Import entry points: decode an extracted tree, or extract an archive and decode it

use chrono::Utc;
use std::path::Path;
use tracing::{debug, info, warn};

use sandboxed_archive::SandboxedExtractor;

use crate::catalog::build_catalogs;
use crate::config::Config;
use crate::errors::{DecodeError, TrpResult};
use crate::ingestor::{DecodeSession, detect_layout, parse_track_file, pipeline_for};
use crate::kpi::select_kpis;
use crate::models::{DecodeResult, ImportReport};

pub const NOTHING_DECODED: &str = "no KPI samples or events decoded";
const SCRATCH_PREFIX: &str = "trp-import-";

/// Decode an already extracted archive rooted at `extracted_root`.
///
/// Structural problems are errors; everything recoverable lands in
/// `import_report.warnings`.
pub fn decode(extracted_root: &Path, config: &Config) -> TrpResult<DecodeResult> {
    config.validate()?;
    let layout = detect_layout(extracted_root)?;

    let track = parse_track_file(&layout.track_xml);
    let anchor = track.first_time().unwrap_or_else(Utc::now);
    debug!("Synthetic clock anchored at {}", anchor);

    let mut session = DecodeSession::new(config, anchor);
    if let Some(warning) = track.warning.clone() {
        session.warn(warning);
    }

    let pipeline = pipeline_for(layout.variant);
    let channel_parser = pipeline.run(&layout, &mut session)?;

    let DecodeSession {
        dictionaries,
        sink,
        frames,
        ..
    } = session;

    let catalogs = build_catalogs(&sink.samples, &sink.events, &dictionaries.declarations);
    let kpi_selection = select_kpis(&catalogs.metrics);

    let mut report = ImportReport::new(pipeline.variant(), channel_parser);
    report.channel_log_frames = frames;
    report.unknown_frames = sink.unknown_frames;
    report.decoded_samples = sink.samples.len();
    report.decoded_events = sink.events.len();
    report.dictionary_loaded = dictionaries.is_loaded();
    report.declarations_count = dictionaries.declarations.len();
    report.lookup_tables_count = dictionaries.lookups.len();
    report.warnings = sink.warnings;
    report.unknown_declaration_records = dictionaries.declarations.unknown_records.clone();
    report.zip_entries_summary = layout.entries;
    if sink.samples.is_empty() && sink.events.is_empty() {
        warn!("{} under {}", NOTHING_DECODED, layout.root.display());
        report.errors.push(NOTHING_DECODED.to_string());
    }

    info!(
        "Decoded {} samples, {} events, {} track points ({:?} via {}, {} frames, {} unknown)",
        report.decoded_samples,
        report.decoded_events,
        track.points.len(),
        report.variant,
        report.channel_parser,
        report.channel_log_frames,
        report.unknown_frames
    );

    Ok(DecodeResult {
        kpi_samples: sink.samples,
        events: sink.events,
        track_points: track.points,
        catalogs,
        kpi_selection,
        import_report: report,
    })
}

/// Safely extract `archive` into a scratch directory and decode it.
///
/// The scratch directory is created under `work_dir`, else `config.runtime.work_dir`,
/// else the system temp dir, and is removed when decoding finishes.
pub fn import_archive(archive: &Path, work_dir: Option<&Path>, config: &Config) -> TrpResult<DecodeResult> {
    let parent = work_dir.or(config.runtime.work_dir.as_deref());
    let mut builder = tempfile::Builder::new();
    builder.prefix(SCRATCH_PREFIX);
    let scratch = match parent {
        Some(dir) => builder.tempdir_in(dir).map_err(|e| DecodeError::io(dir, e))?,
        None => builder
            .tempdir()
            .map_err(|e| DecodeError::io(std::env::temp_dir(), e))?,
    };

    let extractor = SandboxedExtractor::builder()
        .base_directory(scratch.path())
        .max_total_bytes(config.runtime.max_archive_bytes)
        .build()?;
    let summary = extractor.extract(archive)?;
    info!(
        "Extracted {} files ({} bytes) from {}",
        summary.files.len(),
        summary.bytes_written,
        archive.display()
    );

    decode(scratch.path(), config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_invalid_config_rejected_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.limits.max_record_len = 0;
        let err = decode(dir.path(), &config).unwrap_err();
        assert!(matches!(err, DecodeError::Configuration { .. }));
    }

    #[test]
    fn test_empty_channel_log_is_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("channel.log"), b"").unwrap();

        let result = decode(dir.path(), &Config::default()).unwrap();
        assert!(result.is_soft_failure());
        assert_eq!(result.import_report.errors, vec![NOTHING_DECODED]);
        assert!(!result.import_report.dictionary_loaded);
        assert_eq!(result.import_report.channel_log_frames, 0);
        assert_eq!(result.kpi_selection.missing_data.len(), 5);
    }
}
