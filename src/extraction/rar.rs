use crate::error::Result;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::reader::{ArchiveEntry, ArchiveReader, EntryVisitor, unreadable};
use super::shared::{EntrySink, write_error};

/// RAR archives via `unrar`
///
/// `unrar` has no streaming read. [`ArchiveReader::for_each_entry`] buffers
/// each entry in memory, so extraction to disk uses [`RarReader::extract`],
/// which lets the library write every file straight to its target.
pub(crate) struct RarReader {
    path: PathBuf,
}

impl RarReader {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn entry_from(header: &unrar::FileHeader) -> ArchiveEntry {
        ArchiveEntry {
            path: header.filename.to_string_lossy().into_owned(),
            is_dir: header.is_directory(),
        }
    }

    /// Write every entry through `sink`, letting unrar write files directly
    pub(crate) fn extract(&self, sink: &mut EntrySink<'_>) -> Result<()> {
        let mut at_header = unrar::Archive::new(&self.path)
            .open_for_processing()
            .map_err(|e| unreadable(&self.path, "failed to open RAR archive", e))?;
        debug!(archive = %self.path.display(), "extracting RAR");

        // State machine: read_header moves to BeforeFile, extract/skip move back
        loop {
            let at_file = match at_header.read_header() {
                Ok(Some(at_file)) => at_file,
                Ok(None) => break,
                Err(e) => return Err(unreadable(&self.path, "failed to read RAR header", e)),
            };

            let entry = Self::entry_from(at_file.entry());
            let Some(target) = sink.resolve(&entry)? else {
                at_header = at_file
                    .skip()
                    .map_err(|e| unreadable(&self.path, "failed to skip RAR entry", e))?;
                continue;
            };

            match std::fs::remove_file(&target) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(write_error(&target, e)),
            }
            at_header = at_file
                .extract_to(&target)
                .map_err(|e| unreadable(&self.path, "failed to extract RAR entry", e))?;
            sink.record(target);
        }
        Ok(())
    }
}

impl ArchiveReader for RarReader {
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let listing = unrar::Archive::new(&self.path)
            .open_for_listing()
            .map_err(|e| unreadable(&self.path, "failed to open RAR archive", e))?;

        let mut entries = Vec::new();
        for header in listing {
            let header = header.map_err(|e| unreadable(&self.path, "failed to read RAR header", e))?;
            entries.push(Self::entry_from(&header));
        }
        Ok(entries)
    }

    fn for_each_entry(&mut self, visit: &mut EntryVisitor<'_>) -> Result<()> {
        let mut at_header = unrar::Archive::new(&self.path)
            .open_for_processing()
            .map_err(|e| unreadable(&self.path, "failed to open RAR archive", e))?;
        debug!(archive = %self.path.display(), "extracting RAR");

        // State machine: read_header moves to BeforeFile, read/skip move back
        loop {
            let at_file = match at_header.read_header() {
                Ok(Some(at_file)) => at_file,
                Ok(None) => break,
                Err(e) => return Err(unreadable(&self.path, "failed to read RAR header", e)),
            };

            let entry = Self::entry_from(at_file.entry());
            if entry.is_dir {
                visit(&entry, &mut std::io::empty())?;
                at_header = at_file
                    .skip()
                    .map_err(|e| unreadable(&self.path, "failed to skip RAR directory", e))?;
                continue;
            }

            let (data, next) = at_file
                .read()
                .map_err(|e| unreadable(&self.path, "failed to read RAR entry", e))?;
            visit(&entry, &mut Cursor::new(data))?;
            at_header = next;
        }
        Ok(())
    }
}
