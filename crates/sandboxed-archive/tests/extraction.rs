use sandboxed_archive::{SandboxedArchiveError, SandboxedExtractor};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, body) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(body).unwrap();
        }
    }
    writer.finish().unwrap();
}

fn count_files(dir: &Path) -> usize {
    let mut count = 0;
    if let Ok(read) = std::fs::read_dir(dir) {
        for entry in read.flatten() {
            let path = entry.path();
            if path.is_dir() {
                count += count_files(&path);
            } else {
                count += 1;
            }
        }
    }
    count
}

#[test]
fn test_extracts_nested_entries_byte_for_byte() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("run.trp");
    let payload: Vec<u8> = (0u8..=255).collect();
    write_zip(
        &archive,
        &[
            ("trp/", b""),
            ("trp/channel.log", &payload),
            ("trp/positions/wptrack.xml", b"<gpx/>"),
        ],
    );

    let out = temp_dir.path().join("out");
    let extractor = SandboxedExtractor::builder()
        .base_directory(&out)
        .build()
        .unwrap();
    let summary = extractor.extract(&archive).unwrap();

    assert_eq!(summary.files.len(), 2);
    assert_eq!(summary.directories_skipped, 1);
    assert_eq!(summary.bytes_written, 256 + 6);
    assert_eq!(summary.files[0], PathBuf::from("trp/channel.log"));
    assert_eq!(std::fs::read(out.join("trp/channel.log")).unwrap(), payload);
    assert_eq!(
        std::fs::read_to_string(out.join("trp/positions/wptrack.xml")).unwrap(),
        "<gpx/>"
    );
}

#[test]
fn test_zip_slip_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("evil.zip");
    // The safe entry comes first: it must not be written either.
    write_zip(
        &archive,
        &[("trp/channel.log", b"ok"), ("../evil.txt", b"boom")],
    );

    let out = temp_dir.path().join("out");
    let extractor = SandboxedExtractor::builder()
        .base_directory(&out)
        .build()
        .unwrap();
    let err = extractor.extract(&archive).unwrap_err();

    assert!(err.is_path_violation(), "unexpected error: {err}");
    assert_eq!(count_files(&out), 0);
    assert!(!temp_dir.path().join("evil.txt").exists());
}

#[test]
fn test_current_dir_entry_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("dot.zip");
    write_zip(&archive, &[("./", b""), ("channel.log", b"abc")]);

    let out = temp_dir.path().join("out");
    let extractor = SandboxedExtractor::builder()
        .base_directory(&out)
        .build()
        .unwrap();
    let summary = extractor.extract(&archive).unwrap();

    assert_eq!(summary.directories_skipped, 1);
    assert_eq!(summary.files, vec![PathBuf::from("channel.log")]);
    assert_eq!(std::fs::read(out.join("channel.log")).unwrap(), b"abc");
}

#[test]
fn test_parent_dir_entry_is_still_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("dotdot.zip");
    write_zip(&archive, &[("../", b""), ("channel.log", b"abc")]);

    let out = temp_dir.path().join("out");
    let extractor = SandboxedExtractor::builder()
        .base_directory(&out)
        .build()
        .unwrap();
    let err = extractor.extract(&archive).unwrap_err();
    assert!(err.is_path_violation(), "unexpected error: {err}");
    assert_eq!(count_files(&out), 0);
}

#[test]
fn test_absolute_entry_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("abs.zip");
    write_zip(&archive, &[("/tmp/abs-evil.txt", b"boom")]);

    let extractor = SandboxedExtractor::builder()
        .base_directory(temp_dir.path().join("out"))
        .build()
        .unwrap();
    let err = extractor.extract(&archive).unwrap_err();
    assert!(matches!(err, SandboxedArchiveError::PathValidation { .. }));
}

#[test]
fn test_size_limit_is_enforced() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("big.zip");
    let body = vec![b'a'; 4096];
    write_zip(&archive, &[("trp/channel.log", &body)]);

    let extractor = SandboxedExtractor::builder()
        .base_directory(temp_dir.path().join("out"))
        .max_total_bytes(1024)
        .build()
        .unwrap();
    let err = extractor.extract(&archive).unwrap_err();
    assert!(matches!(err, SandboxedArchiveError::SizeLimit { .. }));
}

#[test]
fn test_garbage_input_is_an_archive_error() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("garbage.trp");
    std::fs::write(&archive, b"definitely not a zip file at all").unwrap();

    let extractor = SandboxedExtractor::builder()
        .base_directory(temp_dir.path().join("out"))
        .build()
        .unwrap();
    let err = extractor.extract(&archive).unwrap_err();
    assert!(matches!(err, SandboxedArchiveError::Archive(_)));
}
