//! Security utilities for archive entry validation and sandboxing.

use crate::error::{Result, SandboxedArchiveError};
use std::path::{Component, Path, PathBuf};

/// Sets secure permissions on a directory (Unix only).
pub fn set_secure_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        std::fs::set_permissions(path, perms)?;
    }

    #[cfg(not(unix))]
    {
        if !path.exists() {
            return Err(SandboxedArchiveError::PathValidation {
                path: path.to_path_buf(),
                reason: "Directory does not exist".to_string(),
            });
        }
    }

    Ok(())
}

fn violation(name: &str, reason: &str) -> SandboxedArchiveError {
    SandboxedArchiveError::PathValidation {
        path: PathBuf::from(name),
        reason: reason.to_string(),
    }
}

/// Normalizes a raw archive member name into a relative path confined to the sandbox.
///
/// The name is resolved lexically: `.` segments are dropped and `..` pops the previous
/// segment. Absolute names, drive prefixes, NUL bytes and any `..` that would climb out
/// of the sandbox root are rejected. Backslashes are treated as separators since archives
/// written on Windows use them.
pub fn normalize_entry_name(name: &str) -> Result<PathBuf> {
    let segments = resolve_segments(name)?;
    if segments.is_empty() {
        return Err(violation(name, "Path resolves to the sandbox root itself"));
    }
    Ok(segments.iter().collect())
}

/// Like [`normalize_entry_name`], for directory members.
///
/// A directory that resolves to the sandbox root itself (`./`, `a/../`) is harmless and
/// yields `None`; traversal and absolute names are still rejected.
pub fn normalize_directory_name(name: &str) -> Result<Option<PathBuf>> {
    let segments = resolve_segments(name)?;
    Ok((!segments.is_empty()).then(|| segments.iter().collect()))
}

fn resolve_segments(name: &str) -> Result<Vec<String>> {
    if name.contains('\0') {
        return Err(violation(name, "Path contains null bytes"));
    }

    let unified = name.replace('\\', "/");
    if unified.starts_with('/') {
        return Err(violation(name, "Absolute paths are not allowed"));
    }
    let bytes = unified.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Err(violation(name, "Drive-prefixed paths are not allowed"));
    }

    let mut segments: Vec<String> = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => segments.push(part.to_string()),
                None => return Err(violation(name, "Path is not valid UTF-8")),
            },
            Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(violation(name, "Path escapes sandbox via '..'"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(violation(name, "Absolute paths are not allowed"));
            }
        }
    }
    Ok(segments)
}

/// Validates that a resolved path is within the specified sandbox directory.
/// Uses OS path resolution to handle symlinks, .., ., etc. properly.
pub fn validate_path_within_sandbox(resolved_path: &Path, sandbox_base: &Path) -> Result<()> {
    let canonical_base =
        sandbox_base
            .canonicalize()
            .map_err(|e| SandboxedArchiveError::PathValidation {
                path: sandbox_base.to_path_buf(),
                reason: format!("Failed to resolve sandbox base: {e}"),
            })?;

    // Resolve the target path (may or may not exist)
    let canonical_path = if resolved_path.exists() {
        resolved_path
            .canonicalize()
            .map_err(|e| SandboxedArchiveError::PathValidation {
                path: resolved_path.to_path_buf(),
                reason: format!("Failed to resolve path: {e}"),
            })?
    } else {
        let parent = resolved_path
            .parent()
            .ok_or_else(|| SandboxedArchiveError::PathValidation {
                path: resolved_path.to_path_buf(),
                reason: "Path has no parent directory".to_string(),
            })?;

        let canonical_parent =
            parent
                .canonicalize()
                .map_err(|e| SandboxedArchiveError::PathValidation {
                    path: parent.to_path_buf(),
                    reason: format!("Failed to resolve parent: {e}"),
                })?;

        let filename =
            resolved_path
                .file_name()
                .ok_or_else(|| SandboxedArchiveError::PathValidation {
                    path: resolved_path.to_path_buf(),
                    reason: "Invalid filename".to_string(),
                })?;

        canonical_parent.join(filename)
    };

    if !canonical_path.starts_with(&canonical_base) || canonical_path == canonical_base {
        return Err(SandboxedArchiveError::PathValidation {
            path: resolved_path.to_path_buf(),
            reason: format!(
                "Path escapes sandbox: resolves to '{}' (outside '{}')",
                canonical_path.display(),
                canonical_base.display()
            ),
        });
    }

    Ok(())
}
