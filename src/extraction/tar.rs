use crate::error::Result;
use bzip2::read::BzDecoder;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;
use xz2::read::XzDecoder;

use super::inspector::archive_base_name;
use super::reader::{ArchiveEntry, ArchiveReader, EntryVisitor, unreadable};

/// Stream compression wrapped around a tarball or a single file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

/// `.tar`, `.gz`, `.bz2` and `.xz` files
///
/// A compressed file named `*.tar.<ext>` is read as a tarball. Any other
/// compressed file holds a single stream, presented as one entry named after
/// the archive minus its final extension (`notes.txt.gz` → `notes.txt`).
/// Links and special files inside a tarball are never written.
pub(crate) struct TarReader {
    path: PathBuf,
    compression: Compression,
    skipped: Vec<(String, &'static str)>,
}

impl TarReader {
    pub(crate) fn new(path: &Path, compression: Compression) -> Self {
        Self {
            path: path.to_path_buf(),
            compression,
            skipped: Vec::new(),
        }
    }

    fn is_tarball(&self) -> bool {
        self.compression == Compression::None || looks_like_tar(&self.path)
    }

    fn decoded_stream(&self) -> Result<Box<dyn Read>> {
        let file = File::open(&self.path)
            .map_err(|e| unreadable(&self.path, "failed to open archive", e))?;
        let file = BufReader::new(file);
        Ok(match self.compression {
            Compression::None => Box::new(file),
            Compression::Gzip => Box::new(MultiGzDecoder::new(file)),
            Compression::Bzip2 => Box::new(BzDecoder::new(file)),
            Compression::Xz => Box::new(XzDecoder::new(file)),
        })
    }

    fn single_entry(&self) -> ArchiveEntry {
        ArchiveEntry::file(archive_base_name(&self.path))
    }

    /// Walk tar headers, calling `each` for regular files and directories and
    /// `skip` for links and special files
    fn walk_tar(
        &self,
        mut each: impl FnMut(ArchiveEntry, &mut dyn Read) -> Result<()>,
        mut skip: impl FnMut(String, &'static str),
    ) -> Result<()> {
        let mut archive = tar::Archive::new(self.decoded_stream()?);
        let entries = archive
            .entries()
            .map_err(|e| unreadable(&self.path, "failed to iterate tar", e))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| unreadable(&self.path, "failed to read tar entry", e))?;
            let entry_type = entry.header().entry_type();
            let path = entry
                .path()
                .map_err(|e| unreadable(&self.path, "invalid tar entry path", e))?
                .to_string_lossy()
                .into_owned();

            if entry_type.is_dir() || entry_type.is_file() {
                let item = ArchiveEntry {
                    path,
                    is_dir: entry_type.is_dir(),
                };
                each(item, &mut entry)?;
            } else if entry_type.is_symlink() || entry_type.is_hard_link() {
                skip(path, "link");
            } else if matches!(
                entry_type,
                tar::EntryType::Char | tar::EntryType::Block | tar::EntryType::Fifo
            ) {
                skip(path, "special file");
            } else {
                // Extension headers carry metadata only
                debug!(entry = %path, ?entry_type, "ignoring tar metadata entry");
            }
        }
        Ok(())
    }
}

impl ArchiveReader for TarReader {
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>> {
        if !self.is_tarball() {
            return Ok(vec![self.single_entry()]);
        }
        let mut entries = Vec::new();
        self.walk_tar(
            |entry, _| {
                entries.push(entry);
                Ok(())
            },
            |_, _| {},
        )?;
        Ok(entries)
    }

    fn for_each_entry(&mut self, visit: &mut EntryVisitor<'_>) -> Result<()> {
        debug!(archive = %self.path.display(), compression = ?self.compression, "extracting");
        if !self.is_tarball() {
            let entry = self.single_entry();
            let mut stream = self.decoded_stream()?;
            return visit(&entry, &mut *stream);
        }
        let mut skipped = Vec::new();
        let result = self.walk_tar(
            |entry, stream| visit(&entry, stream),
            |path, reason| skipped.push((path, reason)),
        );
        self.skipped = skipped;
        result
    }

    fn take_skipped(&mut self) -> Vec<(String, &'static str)> {
        std::mem::take(&mut self.skipped)
    }
}

/// `name.tar.gz` and friends: the stem left after the compression suffix ends in `.tar`
fn looks_like_tar(path: &Path) -> bool {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_lowercase().ends_with(".tar"))
        .unwrap_or(false)
}
