//! Root `channel.log` with `declarations.bin` / `lookuptables.bin`

use tracing::info;

use super::{ArchiveLayout, DecodeSession, VariantPipeline};
use crate::errors::{DecodeError, TrpResult};
use crate::models::ArchiveVariant;

#[derive(Debug, Clone, Copy, Default)]
pub struct RawPipeline;

impl VariantPipeline for RawPipeline {
    fn variant(&self) -> ArchiveVariant {
        ArchiveVariant::Raw
    }

    fn run(&self, layout: &ArchiveLayout, session: &mut DecodeSession<'_>) -> TrpResult<String> {
        let channel_log = layout.channel_log.as_deref().ok_or_else(|| {
            DecodeError::missing_layout(&layout.root, "channel.log not found")
        })?;

        session.load_lookups(layout.lookuptables_bin.as_deref(), "lookuptables.bin");
        session.load_declarations(layout.declarations_bin.as_deref(), "declarations.bin");

        let data = session.read_required(channel_log)?;
        let scan = session.decode_channel_stream(&data, true);
        info!(
            "channel.log: {} bytes, {} frames via {}, {} unknown",
            data.len(),
            scan.frames,
            scan.strategy.as_str(),
            session.sink.unknown_frames
        );
        Ok(scan.strategy.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ingestor::detect_layout;
    use crate::utils::time::datetime_from_epoch;
    use std::fs;

    #[test]
    fn test_corrupt_channel_log_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut junk = vec![0u8; 8];
        junk.extend([0x78, 0x9c, 0x00, 0x01, 0x02]);
        fs::write(dir.path().join("channel.log"), &junk).unwrap();

        let layout = detect_layout(dir.path()).unwrap();
        let config = Config::default();
        let mut session = DecodeSession::new(&config, datetime_from_epoch(1_733_530_000, 0).unwrap());

        let err = RawPipeline.run(&layout, &mut session).unwrap_err();
        assert!(matches!(err, DecodeError::Decompression { .. }));
        assert!(session.sink.warnings.contains(&"declarations.bin missing".to_string()));
        assert!(session.sink.warnings.contains(&"lookuptables.bin missing".to_string()));
    }

    #[test]
    fn test_garbage_channel_log_decodes_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let garbage: Vec<u8> = (0..4096u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        let garbage: Vec<u8> = garbage.into_iter().map(|b| if b == 0x78 { 0x77 } else { b }).collect();
        fs::write(dir.path().join("channel.log"), &garbage).unwrap();

        let layout = detect_layout(dir.path()).unwrap();
        let config = Config::default();
        let mut session = DecodeSession::new(&config, datetime_from_epoch(1_733_530_000, 0).unwrap());

        let parser = RawPipeline.run(&layout, &mut session).unwrap();
        assert!(parser == "varint_len" || parser == "u32_len");
        assert!(session.sink.samples.is_empty());
        assert_eq!(session.sink.unknown_frames, session.frames);
    }
}
