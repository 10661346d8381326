//! Archive extraction with wrapper-directory flattening
//!
//! ZIP archives are read directly and RAR files are written by `unrar`
//! itself. Every other supported format (7z, tar and the gz/bz2/xz streams)
//! goes through the [`ArchiveReader`] abstraction. All of them list entries
//! first, decide the flatten plan with [`plan_flatten`], then resolve target
//! paths through the same sink, so flattening, overwrite and cancellation
//! behave the same for every format.

mod inspector;
mod rar;
mod reader;
mod sevenz;
mod shared;
mod tar;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

// Re-exports
pub use inspector::{
    FlattenPlan, archive_base_name, normalize_entry_path, plan_flatten, root_segments,
};
pub use reader::{ArchiveEntry, ArchiveReader, EntryVisitor, open_reader};

use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use crate::similarity::NameSimilarityMatcher;
use crate::types::ArchiveType;
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rar::RarReader;
use shared::EntrySink;
use self::zip::ZipExtractor;

/// How an archive is expanded
#[derive(Clone, Copy, Debug)]
pub struct ExtractOptions {
    /// Strip a single wrapper directory similar to the archive name
    pub flatten_single_root: bool,
    /// Similarity ratio used by the wrapper-name match
    pub similarity_threshold: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            flatten_single_root: true,
            similarity_threshold: crate::similarity::SIMILARITY_THRESHOLD,
        }
    }
}

impl From<&ExtractionConfig> for ExtractOptions {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            flatten_single_root: config.flatten_single_root,
            similarity_threshold: config.similarity_threshold,
        }
    }
}

/// What an extraction wrote
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Files written, in archive order
    pub files: Vec<PathBuf>,
    /// Wrapper directory that was stripped, if any
    pub skipped_prefix: Option<String>,
    /// Entries not written because they were links or escaped the destination
    pub skipped_entries: usize,
}

/// List the entries of an archive without extracting it
pub fn list_entries(archive_path: &Path) -> Result<Vec<ArchiveEntry>> {
    match detect(archive_path)? {
        ArchiveType::Zip => ZipExtractor::list_entries(archive_path),
        other => open_reader(archive_path, other)?.list_entries(),
    }
}

/// Extract `archive_path` into `dest_path` on a blocking thread
///
/// Cancellation is checked before each entry. Entries already written stay
/// on disk when extraction stops early.
pub async fn extract_archive(
    archive_path: &Path,
    dest_path: &Path,
    options: ExtractOptions,
    cancel: CancellationToken,
) -> Result<ExtractionReport> {
    let archive_owned = archive_path.to_path_buf();
    let dest_owned = dest_path.to_path_buf();

    spawn_blocking(move || {
        extract_archive_blocking(&archive_owned, &dest_owned, &options, &cancel)
    })
    .await
    .map_err(|e| Error::Other(format!("extraction task panicked: {}", e)))?
}

/// Synchronous form of [`extract_archive`]
pub fn extract_archive_blocking(
    archive_path: &Path,
    dest_path: &Path,
    options: &ExtractOptions,
    cancel: &CancellationToken,
) -> Result<ExtractionReport> {
    let result = extract_inner(archive_path, dest_path, options, cancel);
    // A failure racing with cancellation is reported as the cancellation
    match result {
        Err(e) if cancel.is_cancelled() && !e.is_cancelled() => Err(Error::Cancelled),
        other => other,
    }
}

fn extract_inner(
    archive_path: &Path,
    dest_path: &Path,
    options: &ExtractOptions,
    cancel: &CancellationToken,
) -> Result<ExtractionReport> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    let archive_type = detect(archive_path)?;
    std::fs::create_dir_all(dest_path).map_err(|e| shared::write_error(dest_path, e))?;

    let matcher = NameSimilarityMatcher::with_threshold(options.similarity_threshold);
    let decide = |entries: &[ArchiveEntry]| {
        if options.flatten_single_root {
            plan_flatten(archive_path, entries, &matcher)
        } else {
            FlattenPlan::preserve()
        }
    };

    let report = match archive_type {
        ArchiveType::Zip => {
            let plan = decide(&ZipExtractor::list_entries(archive_path)?);
            let mut sink = EntrySink::new(archive_path, dest_path, plan, cancel);
            ZipExtractor::extract(archive_path, &mut sink)?;
            sink.finish()
        }
        ArchiveType::Rar => {
            let mut reader = RarReader::new(archive_path);
            let plan = decide(&reader.list_entries()?);
            let mut sink = EntrySink::new(archive_path, dest_path, plan, cancel);
            reader.extract(&mut sink)?;
            sink.finish()
        }
        other => {
            let mut reader = open_reader(archive_path, other)?;
            let plan = decide(&reader.list_entries()?);
            let mut sink = EntrySink::new(archive_path, dest_path, plan, cancel);
            reader.for_each_entry(&mut |entry, stream| sink.accept(entry, stream))?;
            for (path, reason) in reader.take_skipped() {
                sink.skip(&path, reason);
            }
            sink.finish()
        }
    };

    info!(
        archive = %archive_path.display(),
        dest = %dest_path.display(),
        ?archive_type,
        extracted_count = report.files.len(),
        skipped_prefix = report.skipped_prefix.as_deref().unwrap_or(""),
        "extraction complete"
    );
    Ok(report)
}

fn detect(archive_path: &Path) -> Result<ArchiveType> {
    ArchiveType::from_path(archive_path).ok_or_else(|| Error::UnsupportedFormat {
        archive: archive_path.to_path_buf(),
        reason: format!(
            "extension not in {:?}",
            ArchiveType::SUPPORTED_EXTENSIONS
        ),
    })
}
