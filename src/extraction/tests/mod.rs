use super::reader::{ArchiveEntry, ArchiveReader, EntryVisitor};
use super::shared::EntrySink;
use crate::error::{Error, Result};
use crate::extraction::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a ZIP archive; names ending in '/' become directory entries
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap();
}

/// Create a valid 7z archive from a source directory using sevenz_rust
fn create_7z_archive(archive_path: &Path, source_dir: &Path) {
    sevenz_rust::compress_to_path(source_dir, archive_path).unwrap();
}

/// Build an uncompressed tarball in memory
fn tar_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = ::tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = ::tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap()
}

fn write_gzip(path: &Path, data: &[u8]) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap();
}

fn write_bzip2(path: &Path, data: &[u8]) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap();
}

fn write_xz(path: &Path, data: &[u8]) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = xz2::write::XzEncoder::new(file, 6);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap();
}

/// Relative paths of every file under `dir`, sorted, with '/' separators
fn file_set(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    files.sort();
    files
}

async fn extract(archive: &Path, dest: &Path) -> Result<ExtractionReport> {
    extract_archive(archive, dest, ExtractOptions::default(), CancellationToken::new()).await
}

// ---------------------------------------------------------------------------
// ZIP (built-in path)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zip_wrapper_named_like_archive_is_flattened() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Homework1.zip");
    create_zip_archive(
        &archive,
        &[
            ("Homework1/", b""),
            ("Homework1/question.pdf", b"%PDF"),
            ("Homework1/data/input.csv", b"a,b\n1,2\n"),
        ],
    );
    let dest = temp_dir.path().join("out");

    let report = extract(&archive, &dest).await.unwrap();

    assert_eq!(report.skipped_prefix.as_deref(), Some("Homework1"));
    assert_eq!(file_set(&dest), vec!["data/input.csv", "question.pdf"]);
    assert!(!dest.join("Homework1").exists());
    assert_eq!(std::fs::read(dest.join("question.pdf")).unwrap(), b"%PDF");
}

#[tokio::test]
async fn zip_unrelated_root_directory_is_preserved() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Bundle.zip");
    create_zip_archive(&archive, &[("src/main.c", b"int main;"), ("src/util.h", b"")]);
    let dest = temp_dir.path().join("out");

    let report = extract(&archive, &dest).await.unwrap();

    assert_eq!(report.skipped_prefix, None);
    assert_eq!(file_set(&dest), vec!["src/main.c", "src/util.h"]);
}

#[tokio::test]
async fn zip_multi_root_is_never_flattened() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Homework1.zip");
    create_zip_archive(
        &archive,
        &[("Homework1/a.txt", b"a"), ("readme.txt", b"r")],
    );
    let dest = temp_dir.path().join("out");

    extract(&archive, &dest).await.unwrap();

    assert_eq!(file_set(&dest), vec!["Homework1/a.txt", "readme.txt"]);
}

#[tokio::test]
async fn zip_empty_archive_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Empty.zip");
    create_zip_archive(&archive, &[]);
    let dest = temp_dir.path().join("out");

    let report = extract(&archive, &dest).await.unwrap();

    assert!(report.files.is_empty());
    assert!(file_set(&dest).is_empty());
}

#[tokio::test]
async fn zip_extracting_twice_overwrites_instead_of_duplicating() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Homework1.zip");
    create_zip_archive(
        &archive,
        &[("Homework1/a.txt", b"fresh"), ("Homework1/b/c.txt", b"c")],
    );
    let dest = temp_dir.path().join("out");

    extract(&archive, &dest).await.unwrap();
    let first = file_set(&dest);
    std::fs::write(dest.join("a.txt"), b"stale content that is longer").unwrap();
    extract(&archive, &dest).await.unwrap();

    assert_eq!(file_set(&dest), first);
    assert_eq!(std::fs::read(dest.join("a.txt")).unwrap(), b"fresh");
}

#[tokio::test]
async fn zip_in_place_extraction_next_to_archive() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Homework1.zip");
    create_zip_archive(&archive, &[("Homework1/a.txt", b"a")]);

    extract(&archive, temp_dir.path()).await.unwrap();

    assert_eq!(file_set(temp_dir.path()), vec!["Homework1.zip", "a.txt"]);
}

#[tokio::test]
async fn entry_landing_on_the_archive_itself_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Homework1.zip");
    create_zip_archive(
        &archive,
        &[
            ("Homework1/Homework1.zip", b"inner copy"),
            ("Homework1/z.txt", b"z"),
        ],
    );
    let original = std::fs::read(&archive).unwrap();

    let report = extract(&archive, temp_dir.path()).await.unwrap();

    assert_eq!(report.skipped_prefix.as_deref(), Some("Homework1"));
    assert_eq!(report.skipped_entries, 1);
    assert_eq!(report.files, vec![temp_dir.path().join("z.txt")]);
    assert_eq!(std::fs::read(temp_dir.path().join("z.txt")).unwrap(), b"z");
    assert_eq!(std::fs::read(&archive).unwrap(), original);
    assert_eq!(list_entries(&archive).unwrap().len(), 2);
}

#[tokio::test]
async fn archive_is_recognized_through_an_unnormalized_destination() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Bundle.zip");
    create_zip_archive(&archive, &[("Bundle.zip", b"nested"), ("notes.txt", b"n")]);
    let original = std::fs::read(&archive).unwrap();
    let dest = temp_dir.path().join("sub").join("..");
    std::fs::create_dir(temp_dir.path().join("sub")).unwrap();

    let report = extract(&archive, &dest).await.unwrap();

    assert_eq!(report.skipped_entries, 1);
    assert_eq!(file_set(temp_dir.path()), vec!["Bundle.zip", "notes.txt"]);
    assert_eq!(std::fs::read(&archive).unwrap(), original);
}

#[tokio::test]
async fn zip_flattening_can_be_disabled() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Homework1.zip");
    create_zip_archive(&archive, &[("Homework1/a.txt", b"a")]);
    let dest = temp_dir.path().join("out");
    let options = ExtractOptions {
        flatten_single_root: false,
        ..Default::default()
    };

    extract_archive(&archive, &dest, options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(file_set(&dest), vec!["Homework1/a.txt"]);
}

#[tokio::test]
async fn zip_traversal_entries_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Bundle.zip");
    create_zip_archive(&archive, &[("../evil.txt", b"x"), ("docs/ok.txt", b"ok")]);
    let dest = temp_dir.path().join("out");

    let report = extract(&archive, &dest).await.unwrap();

    assert_eq!(report.skipped_entries, 1);
    assert_eq!(file_set(&dest), vec!["docs/ok.txt"]);
    assert!(!temp_dir.path().join("evil.txt").exists());
}

#[tokio::test]
async fn corrupt_zip_is_unsupported_format() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("broken.zip");
    std::fs::write(&archive, b"this is not a zip archive").unwrap();

    let err = extract(&archive, &temp_dir.path().join("out")).await.unwrap_err();

    assert!(
        matches!(err, Error::UnsupportedFormat { .. }),
        "expected UnsupportedFormat, got {err:?}"
    );
}

#[test]
fn list_entries_reports_zip_contents_without_extracting() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Homework1.zip");
    create_zip_archive(&archive, &[("Homework1/", b""), ("Homework1/a.txt", b"a")]);

    let entries = list_entries(&archive).unwrap();

    assert_eq!(
        entries,
        vec![ArchiveEntry::dir("Homework1/"), ArchiveEntry::file("Homework1/a.txt")]
    );
    assert_eq!(file_set(temp_dir.path()), vec!["Homework1.zip"]);
}

// ---------------------------------------------------------------------------
// Reader-backed formats
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sevenz_wrapper_is_flattened() {
    let temp_dir = TempDir::new().unwrap();
    let src_dir = temp_dir.path().join("source");
    std::fs::create_dir_all(src_dir.join("Homework2").join("sub")).unwrap();
    std::fs::write(src_dir.join("Homework2").join("a.txt"), b"Hello, world!").unwrap();
    std::fs::write(src_dir.join("Homework2").join("sub").join("b.bin"), b"\x00\x01").unwrap();

    let archive = temp_dir.path().join("Homework2.7z");
    create_7z_archive(&archive, &src_dir);
    let dest = temp_dir.path().join("out");

    let report = extract(&archive, &dest).await.unwrap();

    assert_eq!(report.skipped_prefix.as_deref(), Some("Homework2"));
    assert_eq!(file_set(&dest), vec!["a.txt", "sub/b.bin"]);
    assert_eq!(
        std::fs::read_to_string(dest.join("a.txt")).unwrap(),
        "Hello, world!"
    );
}

#[tokio::test]
async fn tar_gz_wrapper_is_flattened() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Week3.tar.gz");
    write_gzip(
        &archive,
        &tar_bytes(&[("Week3/slides.pdf", b"%PDF"), ("Week3/lab/run.sh", b"echo hi")]),
    );
    let dest = temp_dir.path().join("out");

    let report = extract(&archive, &dest).await.unwrap();

    assert_eq!(report.skipped_prefix.as_deref(), Some("Week3"));
    assert_eq!(file_set(&dest), vec!["lab/run.sh", "slides.pdf"]);
}

#[tokio::test]
async fn plain_tar_multi_root_is_preserved() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Week3.tar");
    std::fs::write(
        &archive,
        tar_bytes(&[("Week3/a.txt", b"a"), ("extras/b.txt", b"b")]),
    )
    .unwrap();
    let dest = temp_dir.path().join("out");

    let report = extract(&archive, &dest).await.unwrap();

    assert_eq!(report.skipped_prefix, None);
    assert_eq!(file_set(&dest), vec!["Week3/a.txt", "extras/b.txt"]);
}

#[tokio::test]
async fn tar_links_are_skipped_and_counted() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Bundle.tar");
    let mut builder = ::tar::Builder::new(Vec::new());
    let mut header = ::tar::Header::new_gnu();
    header.set_size(1);
    header.set_mode(0o644);
    builder.append_data(&mut header, "x/a.txt", &b"a"[..]).unwrap();
    let mut link = ::tar::Header::new_gnu();
    link.set_entry_type(::tar::EntryType::Symlink);
    link.set_size(0);
    link.set_mode(0o777);
    builder.append_link(&mut link, "x/link", "a.txt").unwrap();
    std::fs::write(&archive, builder.into_inner().unwrap()).unwrap();
    let dest = temp_dir.path().join("out");

    let report = extract(&archive, &dest).await.unwrap();

    assert_eq!(report.skipped_entries, 1);
    assert_eq!(file_set(&dest), vec!["x/a.txt"]);
    assert!(std::fs::symlink_metadata(dest.join("x").join("link")).is_err());
}

#[tokio::test]
async fn gzip_named_like_a_tarball_is_a_single_stream() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("my.tarot.gz");
    write_gzip(&archive, b"cards");
    let dest = temp_dir.path().join("out");

    extract(&archive, &dest).await.unwrap();

    assert_eq!(file_set(&dest), vec!["my.tarot"]);
    assert_eq!(std::fs::read(dest.join("my.tarot")).unwrap(), b"cards");
}

#[tokio::test]
async fn tar_xz_is_extracted() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Bundle.tar.xz");
    write_xz(&archive, &tar_bytes(&[("src/lib.rs", b"// lib")]));
    let dest = temp_dir.path().join("out");

    extract(&archive, &dest).await.unwrap();

    assert_eq!(file_set(&dest), vec!["src/lib.rs"]);
}

#[tokio::test]
async fn single_stream_bzip2_decompresses_to_stripped_name() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("notes.txt.bz2");
    write_bzip2(&archive, b"lecture notes");
    let dest = temp_dir.path().join("out");

    let report = extract(&archive, &dest).await.unwrap();

    assert_eq!(report.skipped_prefix, None);
    assert_eq!(file_set(&dest), vec!["notes.txt"]);
    assert_eq!(
        std::fs::read_to_string(dest.join("notes.txt")).unwrap(),
        "lecture notes"
    );
}

#[tokio::test]
async fn corrupt_gzip_stream_is_unsupported_format() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("notes.txt.gz");
    std::fs::write(&archive, b"\x1f\x8b garbage that is not deflate").unwrap();

    let err = extract(&archive, &temp_dir.path().join("out")).await.unwrap_err();

    assert!(
        matches!(err, Error::UnsupportedFormat { .. }),
        "expected UnsupportedFormat, got {err:?}"
    );
}

/// Stored (uncompressed) RAR 4 archive holding `Homework1/`,
/// `Homework1/a.txt` ("alpha") and `Homework1/sub/b.txt` ("beta")
const HOMEWORK1_RAR: &[u8] = &[
    0x52, 0x61, 0x72, 0x21, 0x1a, 0x07, 0x00, 0xcf, 0x90, 0x73, 0x00, 0x00,
    0x0d, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3f, 0x7f, 0x74, 0xe0,
    0x80, 0x29, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x21, 0x5a, 0x14, 0x30, 0x09, 0x00,
    0xed, 0x41, 0x00, 0x00, 0x48, 0x6f, 0x6d, 0x65, 0x77, 0x6f, 0x72, 0x6b,
    0x31, 0xfa, 0xa9, 0x74, 0x00, 0x80, 0x2f, 0x00, 0x05, 0x00, 0x00, 0x00,
    0x05, 0x00, 0x00, 0x00, 0x03, 0x6a, 0x39, 0xe0, 0xd0, 0x00, 0x00, 0x21,
    0x5a, 0x14, 0x30, 0x0f, 0x00, 0xa4, 0x81, 0x00, 0x00, 0x48, 0x6f, 0x6d,
    0x65, 0x77, 0x6f, 0x72, 0x6b, 0x31, 0x2f, 0x61, 0x2e, 0x74, 0x78, 0x74,
    0x61, 0x6c, 0x70, 0x68, 0x61, 0x6c, 0xfc, 0x74, 0x00, 0x80, 0x33, 0x00,
    0x04, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x03, 0x63, 0x04, 0x91,
    0x8f, 0x00, 0x00, 0x21, 0x5a, 0x14, 0x30, 0x13, 0x00, 0xa4, 0x81, 0x00,
    0x00, 0x48, 0x6f, 0x6d, 0x65, 0x77, 0x6f, 0x72, 0x6b, 0x31, 0x2f, 0x73,
    0x75, 0x62, 0x2f, 0x62, 0x2e, 0x74, 0x78, 0x74, 0x62, 0x65, 0x74, 0x61,
    0xc4, 0x3d, 0x7b, 0x00, 0x40, 0x07, 0x00,
];

#[tokio::test]
async fn rar_is_written_by_unrar_and_flattened() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Homework1.rar");
    std::fs::write(&archive, HOMEWORK1_RAR).unwrap();
    let dest = temp_dir.path().join("out");
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join("a.txt"), b"stale content that is longer").unwrap();

    let report = extract(&archive, &dest).await.unwrap();

    assert_eq!(report.skipped_prefix.as_deref(), Some("Homework1"));
    assert_eq!(file_set(&dest), vec!["a.txt", "sub/b.txt"]);
    assert_eq!(report.files.len(), 2);
    assert_eq!(std::fs::read(dest.join("a.txt")).unwrap(), b"alpha");
    assert_eq!(std::fs::read(dest.join("sub").join("b.txt")).unwrap(), b"beta");
}

#[tokio::test]
async fn corrupt_rar_is_unsupported_format() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Exam.rar");
    std::fs::write(&archive, b"definitely not a RAR archive").unwrap();

    let err = extract(&archive, &temp_dir.path().join("out")).await.unwrap_err();

    assert!(
        matches!(err, Error::UnsupportedFormat { .. }),
        "expected UnsupportedFormat, got {err:?}"
    );
}

#[tokio::test]
async fn unknown_extension_is_unsupported_format() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("guide.pdf");
    std::fs::write(&archive, b"%PDF").unwrap();

    let err = extract(&archive, &temp_dir.path().join("out")).await.unwrap_err();

    assert!(matches!(err, Error::UnsupportedFormat { .. }));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_before_start_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("Homework1.zip");
    create_zip_archive(&archive, &[("Homework1/a.txt", b"a")]);
    let dest = temp_dir.path().join("out");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = extract_archive(&archive, &dest, ExtractOptions::default(), cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(!dest.exists());
}

/// Reader that requests cancellation just before handing out entry `cancel_at`
struct CancellingReader {
    entries: Vec<(ArchiveEntry, &'static [u8])>,
    cancel_at: usize,
    token: CancellationToken,
}

impl ArchiveReader for CancellingReader {
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        Ok(self.entries.iter().map(|(e, _)| e.clone()).collect())
    }

    fn for_each_entry(&mut self, visit: &mut EntryVisitor<'_>) -> Result<()> {
        for (index, (entry, data)) in self.entries.iter().enumerate() {
            if index == self.cancel_at {
                self.token.cancel();
            }
            let mut stream: &[u8] = data;
            visit(entry, &mut stream)?;
        }
        Ok(())
    }
}

#[test]
fn cancellation_mid_archive_keeps_written_entries() {
    let temp_dir = TempDir::new().unwrap();
    let token = CancellationToken::new();
    let mut reader = CancellingReader {
        entries: vec![
            (ArchiveEntry::file("a.txt"), &b"first"[..]),
            (ArchiveEntry::file("b.txt"), &b"second"[..]),
            (ArchiveEntry::file("c.txt"), &b"third"[..]),
        ],
        cancel_at: 1,
        token: token.clone(),
    };
    let archive = PathBuf::from("Bundle.zip");
    let mut sink = EntrySink::new(&archive, temp_dir.path(), FlattenPlan::preserve(), &token);

    let result = reader.for_each_entry(&mut |entry, stream| sink.accept(entry, stream));

    assert!(matches!(result, Err(Error::Cancelled)));
    let report = sink.finish();
    assert_eq!(report.files, vec![temp_dir.path().join("a.txt")]);
    assert_eq!(file_set(temp_dir.path()), vec!["a.txt"]);
}
