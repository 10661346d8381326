use crate::error::Result;
use std::fs::File;
use std::path::Path;
use tracing::debug;

use super::reader::{ArchiveEntry, unreadable};
use super::shared::EntrySink;

/// Unix mode bits marking a symbolic link
const S_IFLNK: u32 = 0o120000;
const S_IFMT: u32 = 0o170000;

/// Built-in ZIP support, read directly with the `zip` crate
pub(crate) struct ZipExtractor;

impl ZipExtractor {
    fn open(archive_path: &Path) -> Result<zip::ZipArchive<File>> {
        let file = File::open(archive_path).map_err(|e| unreadable(archive_path, "failed to open ZIP", e))?;
        zip::ZipArchive::new(file).map_err(|e| unreadable(archive_path, "failed to read ZIP", e))
    }

    /// Entry names and kinds without extracting
    pub(crate) fn list_entries(archive_path: &Path) -> Result<Vec<ArchiveEntry>> {
        let mut archive = Self::open(archive_path)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive
                .by_index(index)
                .map_err(|e| unreadable(archive_path, "failed to read ZIP entry", e))?;
            entries.push(ArchiveEntry {
                path: file.name().to_string(),
                is_dir: file.is_dir(),
            });
        }
        Ok(entries)
    }

    /// Write every entry through `sink`
    pub(crate) fn extract(archive_path: &Path, sink: &mut EntrySink<'_>) -> Result<()> {
        let mut archive = Self::open(archive_path)?;
        debug!(archive = %archive_path.display(), entries = archive.len(), "extracting ZIP");

        for index in 0..archive.len() {
            sink.check_cancelled()?;

            let mut file = archive
                .by_index(index)
                .map_err(|e| unreadable(archive_path, "failed to read ZIP entry", e))?;

            let is_symlink = file
                .unix_mode()
                .is_some_and(|mode| mode & S_IFMT == S_IFLNK);
            if is_symlink {
                let name = file.name().to_string();
                sink.skip(&name, "symbolic link");
                continue;
            }

            let entry = ArchiveEntry {
                path: file.name().to_string(),
                is_dir: file.is_dir(),
            };
            sink.accept(&entry, &mut file)?;
        }
        Ok(())
    }
}
