//! Per-provider `channel.log` streams

use std::path::Path;
use tracing::info;

use super::{ArchiveLayout, DecodeSession, VariantPipeline};
use crate::errors::TrpResult;
use crate::models::ArchiveVariant;

pub const PARSER_NAME: &str = "provider_channels";

/// Decodes every `providers/*/channel.log` independently with one shared clock
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderChannelsPipeline;

impl ProviderChannelsPipeline {
    /// Decode each provider log; a log that cannot be read or inflated is skipped with a
    /// warning. Returns the number of logs decoded.
    pub fn decode_logs(&self, layout: &ArchiveLayout, session: &mut DecodeSession<'_>) -> usize {
        let mut decoded = 0;
        for log in &layout.provider_channel_logs {
            let name = display_name(&layout.root, log);
            match session.read_required(log) {
                Ok(data) => {
                    let scan = session.decode_channel_stream(&data, false);
                    info!(
                        "{}: {} frames via {}",
                        name,
                        scan.frames,
                        scan.strategy.as_str()
                    );
                    decoded += 1;
                }
                Err(e) => session.warn(format!("channel parse failed {name}: {e}")),
            }
        }
        decoded
    }
}

fn display_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

impl VariantPipeline for ProviderChannelsPipeline {
    fn variant(&self) -> ArchiveVariant {
        ArchiveVariant::ProviderChannels
    }

    fn run(&self, layout: &ArchiveLayout, session: &mut DecodeSession<'_>) -> TrpResult<String> {
        session.load_lookups(layout.lookuptables_bin.as_deref(), "lookuptables.bin");
        session.load_declarations(layout.declarations_bin.as_deref(), "declarations.bin");
        self.decode_logs(layout, session);
        Ok(PARSER_NAME.to_string())
    }
}
