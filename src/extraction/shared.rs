use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ExtractionReport;
use super::inspector::FlattenPlan;
use super::reader::ArchiveEntry;

/// Writes entries under a destination directory, applying the flatten plan
///
/// Shared by the ZIP path and every [`ArchiveReader`](super::ArchiveReader), so
/// path handling, overwrite behavior and cancellation are identical across formats.
pub(crate) struct EntrySink<'a> {
    archive: &'a Path,
    /// Resolved archive path, used to refuse entries that would overwrite it
    archive_canonical: Option<PathBuf>,
    dest: &'a Path,
    plan: FlattenPlan,
    cancel: &'a CancellationToken,
    files: Vec<PathBuf>,
    skipped: usize,
}

impl<'a> EntrySink<'a> {
    pub(crate) fn new(
        archive: &'a Path,
        dest: &'a Path,
        plan: FlattenPlan,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            archive,
            archive_canonical: std::fs::canonicalize(archive).ok(),
            dest,
            plan,
            cancel,
            files: Vec::new(),
            skipped: 0,
        }
    }

    /// Fail with [`Error::Cancelled`] if cancellation was requested
    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Count an entry that is deliberately not written (links and the like)
    pub(crate) fn skip(&mut self, entry: &str, reason: &str) {
        warn!(entry, reason, "skipping archive entry");
        self.skipped += 1;
    }

    /// Write one entry, or create it if it is a directory
    pub(crate) fn accept(&mut self, entry: &ArchiveEntry, contents: &mut dyn Read) -> Result<()> {
        let Some(target) = self.resolve(entry)? else {
            return Ok(());
        };
        write_file(self.archive, &target, contents)?;
        self.record(target);
        Ok(())
    }

    /// Decide where a file entry goes, with its parent directory in place
    ///
    /// Directory entries are created here and yield `None`, as do entries
    /// outside the flatten plan and entries that are skipped. The caller
    /// writes the file and then calls [`record`](Self::record).
    pub(crate) fn resolve(&mut self, entry: &ArchiveEntry) -> Result<Option<PathBuf>> {
        self.check_cancelled()?;

        let Some(relative) = self.plan.relative_path(&entry.path) else {
            return Ok(None);
        };
        let Some(relative) = clean_relative_path(&relative) else {
            self.skip(&entry.path, "path escapes destination");
            return Ok(None);
        };
        let target = self.dest.join(relative);

        if entry.is_dir {
            std::fs::create_dir_all(&target).map_err(|e| write_error(&target, e))?;
            return Ok(None);
        }
        if self.is_archive(&target) {
            self.skip(&entry.path, "entry would overwrite the archive being read");
            return Ok(None);
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| write_error(&target, e))?;
        }
        Ok(Some(target))
    }

    /// Note a file written to a path handed out by [`resolve`](Self::resolve)
    pub(crate) fn record(&mut self, target: PathBuf) {
        debug!(path = %target.display(), "extracted entry");
        self.files.push(target);
    }

    fn is_archive(&self, target: &Path) -> bool {
        if target == self.archive {
            return true;
        }
        match (&self.archive_canonical, std::fs::canonicalize(target)) {
            (Some(archive), Ok(target)) => *archive == target,
            _ => false,
        }
    }

    pub(crate) fn finish(self) -> ExtractionReport {
        ExtractionReport {
            files: self.files,
            skipped_prefix: self.plan.skip_prefix().map(str::to_string),
            skipped_entries: self.skipped,
        }
    }
}

/// Create `target` (truncating an existing file) and copy `contents` into it
///
/// Failures reading `contents` mean the archive is damaged and are reported
/// against `archive`; failures writing are reported against `target`.
fn write_file(archive: &Path, target: &Path, contents: &mut dyn Read) -> Result<()> {
    let file = File::create(target).map_err(|e| write_error(target, e))?;
    let mut writer = BufWriter::with_capacity(64 * 1024, file);
    let mut source = ReadSide {
        inner: contents,
        failed: false,
    };
    if let Err(e) = std::io::copy(&mut source, &mut writer) {
        if source.failed {
            return Err(Error::UnsupportedFormat {
                archive: archive.to_path_buf(),
                reason: format!("corrupt entry {}: {}", target.display(), e),
            });
        }
        return Err(write_error(target, e));
    }
    writer.flush().map_err(|e| write_error(target, e))?;
    Ok(())
}

/// Remembers whether a copy failed on the reading side
struct ReadSide<'r> {
    inner: &'r mut dyn Read,
    failed: bool,
}

impl Read for ReadSide<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let result = self.inner.read(buf);
        if result.is_err() {
            self.failed = true;
        }
        result
    }
}

pub(crate) fn write_error(path: &Path, e: std::io::Error) -> Error {
    Error::EntryWrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Rebuild a normalized entry path from normal components only
///
/// Returns `None` if any component would leave the destination.
fn clean_relative_path(relative: &str) -> Option<PathBuf> {
    let mut cleaned = PathBuf::new();
    for segment in relative.split('/') {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => cleaned.push(part),
            _ => return None,
        }
    }
    (!cleaned.as_os_str().is_empty()).then_some(cleaned)
}
