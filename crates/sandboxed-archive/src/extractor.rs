//! Zip extraction confined to a sandbox directory.

use crate::{
    error::{Result, SandboxedArchiveError},
    security::{
        normalize_directory_name, normalize_entry_name, set_secure_permissions,
        validate_path_within_sandbox,
    },
};

use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
};
use zip::ZipArchive;

/// Default ceiling on the total number of uncompressed bytes an extraction may write (4 GiB).
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Bytes read from the head of the input for magic number sniffing.
const SNIFF_BYTES: usize = 8192;

/// Container formats that are zip files underneath.
const ZIP_FAMILY_EXTENSIONS: &[&str] = &[
    "zip", "jar", "apk", "docx", "xlsx", "pptx", "odt", "ods", "odp", "epub",
];

/// Outcome of a successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractionSummary {
    pub base_directory: PathBuf,
    /// Normalized relative paths of every file written, in archive order.
    pub files: Vec<PathBuf>,
    pub bytes_written: u64,
    pub directories_skipped: usize,
}

/// A validated member of the archive, ready to be written.
#[derive(Debug)]
struct PlannedEntry {
    index: usize,
    relative: PathBuf,
}

/// Extracts zip archives into a single base directory, refusing any member that would
/// land outside of it.
///
/// Extraction is two-phase: every member name is validated before the first byte is
/// written, so an archive carrying a single traversal entry leaves the sandbox untouched.
#[derive(Debug, Clone)]
pub struct SandboxedExtractor {
    base_dir: PathBuf,
    max_total_bytes: u64,
}

impl SandboxedExtractor {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> SandboxedExtractorBuilder {
        SandboxedExtractorBuilder::new()
    }

    /// The sandbox root every entry is written beneath.
    #[must_use]
    pub fn base_directory(&self) -> &Path {
        &self.base_dir
    }

    /// Extract every file entry of the zip at `archive_path`.
    ///
    /// # Errors
    /// - [`SandboxedArchiveError::PathValidation`] if any entry is absolute or climbs out of
    ///   the sandbox; nothing is written in that case
    /// - [`SandboxedArchiveError::UnsupportedContentType`] if the input is some other format
    /// - [`SandboxedArchiveError::SizeLimit`] if the uncompressed total exceeds the ceiling
    /// - I/O and zip container errors
    pub fn extract<P: AsRef<Path>>(&self, archive_path: P) -> Result<ExtractionSummary> {
        let archive_path = archive_path.as_ref();
        check_content_type(archive_path)?;

        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file)?;

        let (plan, directories_skipped) = plan_entries(&mut archive, self.max_total_bytes)?;

        let mut files = Vec::with_capacity(plan.len());
        let mut bytes_written: u64 = 0;

        for entry in plan {
            let target = self.base_dir.join(&entry.relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    SandboxedArchiveError::DirectoryCreation {
                        path: parent.to_path_buf(),
                        source: e,
                    }
                })?;
            }
            validate_path_within_sandbox(&target, &self.base_dir)?;

            let remaining = self.max_total_bytes.saturating_sub(bytes_written);
            let zipped = archive.by_index(entry.index)?;
            let mut limited = zipped.take(remaining.saturating_add(1));
            let mut out = File::create(&target)?;
            let copied = io::copy(&mut limited, &mut out)?;

            bytes_written += copied;
            if bytes_written > self.max_total_bytes {
                return Err(SandboxedArchiveError::SizeLimit {
                    written: bytes_written,
                    limit: self.max_total_bytes,
                });
            }

            tracing::debug!("Extracted {:?} ({} bytes)", entry.relative, copied);
            files.push(entry.relative);
        }

        tracing::info!(
            "Extracted {} files ({} bytes) from {:?} into {:?}",
            files.len(),
            bytes_written,
            archive_path,
            self.base_dir
        );

        Ok(ExtractionSummary {
            base_directory: self.base_dir.clone(),
            files,
            bytes_written,
            directories_skipped,
        })
    }
}

/// Validate every member name and return the file entries to write.
fn plan_entries<R: Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    max_total_bytes: u64,
) -> Result<(Vec<PlannedEntry>, usize)> {
    let mut plan = Vec::with_capacity(archive.len());
    let mut directories_skipped = 0;
    let mut declared_total: u64 = 0;

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        if entry.is_dir() {
            normalize_directory_name(entry.name())?;
            directories_skipped += 1;
            continue;
        }
        let relative = normalize_entry_name(entry.name())?;

        declared_total = declared_total.saturating_add(entry.size());
        if declared_total > max_total_bytes {
            return Err(SandboxedArchiveError::SizeLimit {
                written: declared_total,
                limit: max_total_bytes,
            });
        }

        plan.push(PlannedEntry { index, relative });
    }

    Ok((plan, directories_skipped))
}

/// Reject inputs whose magic bytes identify a non-zip format. Unknown content is left
/// for the zip reader to judge.
fn check_content_type(archive_path: &Path) -> Result<()> {
    let mut head = Vec::with_capacity(SNIFF_BYTES);
    File::open(archive_path)?
        .take(SNIFF_BYTES as u64)
        .read_to_end(&mut head)?;

    if let Some(kind) = infer::get(&head) {
        let is_zip = kind.mime_type() == "application/zip"
            || ZIP_FAMILY_EXTENSIONS.contains(&kind.extension());
        if !is_zip {
            return Err(SandboxedArchiveError::UnsupportedContentType {
                content_type: kind.mime_type().to_string(),
            });
        }
    }

    Ok(())
}

/// Builder for [`SandboxedExtractor`].
#[derive(Debug)]
pub struct SandboxedExtractorBuilder {
    base_directory: Option<PathBuf>,
    max_total_bytes: u64,
    secure_permissions: bool,
}

impl SandboxedExtractorBuilder {
    fn new() -> Self {
        Self {
            base_directory: None,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            secure_permissions: true,
        }
    }

    /// Set the directory entries are extracted into.
    #[must_use]
    pub fn base_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base_directory = Some(path.into());
        self
    }

    /// Set the ceiling on total uncompressed bytes.
    #[must_use]
    pub const fn max_total_bytes(mut self, limit: u64) -> Self {
        self.max_total_bytes = limit;
        self
    }

    /// Restrict the base directory to the current user (Unix). Enabled by default.
    #[must_use]
    pub const fn secure_permissions(mut self, enabled: bool) -> Self {
        self.secure_permissions = enabled;
        self
    }

    /// Build the `SandboxedExtractor`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Base directory is not set
    /// - Base directory cannot be created or secured
    pub fn build(self) -> Result<SandboxedExtractor> {
        let base_dir = self
            .base_directory
            .ok_or_else(|| SandboxedArchiveError::Configuration {
                message: "Base directory is required".to_string(),
            })?;

        if self.max_total_bytes == 0 {
            return Err(SandboxedArchiveError::Configuration {
                message: "max_total_bytes must be greater than zero".to_string(),
            });
        }

        fs::create_dir_all(&base_dir).map_err(|e| SandboxedArchiveError::DirectoryCreation {
            path: base_dir.clone(),
            source: e,
        })?;

        if self.secure_permissions {
            set_secure_permissions(&base_dir)?;
        }

        Ok(SandboxedExtractor {
            base_dir,
            max_total_bytes: self.max_total_bytes,
        })
    }
}
