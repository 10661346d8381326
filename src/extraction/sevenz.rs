use crate::error::{Error, Result};
use sevenz_rust::{Password, SevenZReader};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::reader::{ArchiveEntry, ArchiveReader, EntryVisitor, unreadable};

/// 7z archives via `sevenz-rust`
pub(crate) struct SevenZipReader {
    path: PathBuf,
}

impl SevenZipReader {
    pub(crate) fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    fn open(&self) -> Result<SevenZReader<File>> {
        SevenZReader::open(&self.path, Password::empty())
            .map_err(|e| unreadable(&self.path, "failed to open 7z archive", e))
    }
}

impl ArchiveReader for SevenZipReader {
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        let reader = self.open()?;
        Ok(reader
            .archive()
            .files
            .iter()
            .map(|file| ArchiveEntry {
                path: file.name().to_string(),
                is_dir: file.is_directory(),
            })
            .collect())
    }

    fn for_each_entry(&mut self, visit: &mut EntryVisitor<'_>) -> Result<()> {
        let mut reader = self.open()?;
        debug!(archive = %self.path.display(), "extracting 7z");

        // The walk callback can only return the library's error type, so our
        // own errors are parked here and the walk is stopped with Ok(false).
        let mut failure: Option<Error> = None;
        let archive_path = self.path.clone();

        reader
            .for_each_entries(|file, stream| {
                let entry = ArchiveEntry {
                    path: file.name().to_string(),
                    is_dir: file.is_directory(),
                };
                if let Err(e) = visit(&entry, stream) {
                    failure = Some(e);
                    return Ok(false);
                }
                // Solid blocks share one decoder: consume whatever the visitor left
                if let Err(e) = std::io::copy(stream, &mut std::io::sink()) {
                    failure = Some(unreadable(&archive_path, "failed to read 7z entry", e));
                    return Ok(false);
                }
                Ok(true)
            })
            .map_err(|e| unreadable(&self.path, "failed to read 7z archive", e))?;

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
