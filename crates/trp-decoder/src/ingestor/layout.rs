//! Classification of an extracted archive tree

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::{DecodeError, TrpResult};
use crate::models::{ArchiveVariant, EntriesSummary};

const TRP_DIR: &str = "trp";
const PROVIDERS_DIR: &str = "providers";
const CDF_DIR: &str = "cdf";
const CHANNEL_LOG: &str = "channel.log";
const SAMPLE_ENTRY_LIMIT: usize = 120;

/// One `providers/<name>` directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDir {
    pub name: String,
    pub path: PathBuf,
    pub declarations_cdf: Option<PathBuf>,
    pub lookuptables_cdf: Option<PathBuf>,
    pub data_cdf: Option<PathBuf>,
}

impl ProviderDir {
    pub fn has_cdf(&self) -> bool {
        self.declarations_cdf.is_some() || self.lookuptables_cdf.is_some() || self.data_cdf.is_some()
    }
}

/// Paths of interest under the TRP root, plus the detected variant
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    pub variant: ArchiveVariant,
    pub root: PathBuf,
    pub providers: Vec<ProviderDir>,
    /// Every `channel.log` below `providers/`, sorted
    pub provider_channel_logs: Vec<PathBuf>,
    pub channel_log: Option<PathBuf>,
    pub declarations_bin: Option<PathBuf>,
    pub lookuptables_bin: Option<PathBuf>,
    pub track_xml: PathBuf,
    pub entries: EntriesSummary,
}

fn existing_file(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

/// The `trp/` subdirectory when present, else the extraction root itself
pub fn trp_root(extracted_root: &Path) -> PathBuf {
    let nested = extracted_root.join(TRP_DIR);
    if nested.is_dir() {
        nested
    } else {
        extracted_root.to_path_buf()
    }
}

fn scan_providers(root: &Path) -> Vec<ProviderDir> {
    let Ok(entries) = std::fs::read_dir(root.join(PROVIDERS_DIR)) else {
        return Vec::new();
    };
    let mut providers: Vec<ProviderDir> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| {
            let path = entry.path();
            let cdf = path.join(CDF_DIR);
            ProviderDir {
                name: entry.file_name().to_string_lossy().into_owned(),
                declarations_cdf: existing_file(cdf.join("declarations.cdf")),
                lookuptables_cdf: existing_file(cdf.join("lookuptables.cdf")),
                data_cdf: existing_file(cdf.join("data.cdf")),
                path,
            }
        })
        .collect();
    providers.sort_by(|a, b| a.name.cmp(&b.name));
    providers
}

fn scan_provider_channel_logs(root: &Path) -> Vec<PathBuf> {
    let providers = root.join(PROVIDERS_DIR);
    if !providers.is_dir() {
        return Vec::new();
    }
    let mut logs: Vec<PathBuf> = WalkDir::new(&providers)
        .follow_links(false)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .eq_ignore_ascii_case(CHANNEL_LOG)
        })
        .map(|entry| entry.into_path())
        .collect();
    logs.sort();
    logs
}

fn summarize_entries(extracted_root: &Path, root: &Path) -> Vec<String> {
    let mut entries: Vec<String> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(extracted_root)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    entries.sort();
    entries
}

/// Work out which of the known layouts `extracted_root` holds.
///
/// Order: provider CDF directories, then a root `channel.log`, then provider channel logs
/// on their own. Anything else is a structural error.
pub fn detect_layout(extracted_root: &Path) -> TrpResult<ArchiveLayout> {
    let root = trp_root(extracted_root);
    let providers = scan_providers(&root);
    let provider_channel_logs = scan_provider_channel_logs(&root);
    let channel_log = existing_file(root.join(CHANNEL_LOG));
    let declarations_bin = existing_file(root.join("declarations.bin"));
    let lookuptables_bin = existing_file(root.join("lookuptables.bin"));
    let track_xml = root.join("positions").join("wptrack.xml");

    let variant = if providers.iter().any(ProviderDir::has_cdf) {
        ArchiveVariant::Cdf
    } else if channel_log.is_some() {
        ArchiveVariant::Raw
    } else if !provider_channel_logs.is_empty() {
        ArchiveVariant::ProviderChannels
    } else {
        return Err(DecodeError::missing_layout(
            &root,
            "expected providers/*/cdf/*.cdf, channel.log or providers/*/channel.log",
        ));
    };

    let all_entries = summarize_entries(extracted_root, &root);
    let entries = EntriesSummary {
        total_entries: all_entries.len(),
        has_channel_log: channel_log.is_some() || !provider_channel_logs.is_empty(),
        has_declarations: declarations_bin.is_some()
            || providers.iter().any(|p| p.declarations_cdf.is_some()),
        has_lookup_tables: lookuptables_bin.is_some()
            || providers.iter().any(|p| p.lookuptables_cdf.is_some()),
        has_track_xml: track_xml.is_file(),
        sample_entries: all_entries.into_iter().take(SAMPLE_ENTRY_LIMIT).collect(),
    };

    info!(
        "Detected {:?} layout under {} ({} entries, {} providers)",
        variant,
        root.display(),
        entries.total_entries,
        providers.len()
    );
    debug!("Provider channel logs: {:?}", provider_channel_logs);

    Ok(ArchiveLayout {
        variant,
        root,
        providers,
        provider_channel_logs,
        channel_log,
        declarations_bin,
        lookuptables_bin,
        track_xml,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_cdf_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "trp/providers/sp1/cdf/data.cdf");
        touch(dir.path(), "trp/channel.log");

        let layout = detect_layout(dir.path()).unwrap();
        assert_eq!(layout.variant, ArchiveVariant::Cdf);
        assert_eq!(layout.providers.len(), 1);
        assert_eq!(layout.providers[0].name, "sp1");
        assert!(layout.entries.sample_entries.contains(&"trp/channel.log".to_string()));
    }

    #[test]
    fn test_raw_without_trp_prefix() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "channel.log");
        touch(dir.path(), "declarations.bin");

        let layout = detect_layout(dir.path()).unwrap();
        assert_eq!(layout.variant, ArchiveVariant::Raw);
        assert!(layout.declarations_bin.is_some());
        assert!(layout.lookuptables_bin.is_none());
    }

    #[test]
    fn test_provider_channels_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "trp/providers/sp2/Channel.log");
        touch(dir.path(), "trp/providers/sp1/nested/channel.log");

        let layout = detect_layout(dir.path()).unwrap();
        assert_eq!(layout.variant, ArchiveVariant::ProviderChannels);
        assert_eq!(layout.provider_channel_logs.len(), 2);
        assert!(layout.provider_channel_logs[0].ends_with("sp1/nested/channel.log"));
    }

    #[test]
    fn test_unknown_layout_is_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "trp/readme.txt");
        let err = detect_layout(dir.path()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingLayout { .. }));
    }
}
