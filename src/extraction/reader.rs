//! Format-agnostic archive access
//!
//! Every non-ZIP format is read through [`ArchiveReader`], which offers two
//! operations: list entry paths without extracting, and visit each entry with
//! a stream of its contents. The flattening decision and the write path only
//! ever see [`ArchiveEntry`] values, so they do not depend on the format.

use crate::error::{Error, Result};
use crate::types::ArchiveType;
use std::io::Read;
use std::path::Path;

use super::rar::RarReader;
use super::sevenz::SevenZipReader;
use super::tar::{Compression, TarReader};

/// One entry as recorded inside an archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path as stored in the archive, before any normalization
    pub path: String,
    /// True for directory entries
    pub is_dir: bool,
}

impl ArchiveEntry {
    /// File entry
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: false,
        }
    }

    /// Directory entry
    pub fn dir(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
        }
    }
}

/// Callback invoked once per entry with a stream over the entry's bytes
///
/// Returning an error stops the walk and propagates it.
pub type EntryVisitor<'a> = dyn FnMut(&ArchiveEntry, &mut dyn Read) -> Result<()> + 'a;

/// Uniform "list entries / open entry stream" access to an archive
pub trait ArchiveReader {
    /// All entries in archive order, without extracting anything
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>>;

    /// Visit every entry in archive order
    fn for_each_entry(&mut self, visit: &mut EntryVisitor<'_>) -> Result<()>;

    /// Entries the last walk passed over without visiting, with the reason
    ///
    /// Formats that hand every entry to the visitor keep the default.
    fn take_skipped(&mut self) -> Vec<(String, &'static str)> {
        Vec::new()
    }
}

/// Open `archive` with the reader for `archive_type`
///
/// ZIP is handled directly by the extractor and has no reader here.
pub fn open_reader(archive: &Path, archive_type: ArchiveType) -> Result<Box<dyn ArchiveReader>> {
    let reader: Box<dyn ArchiveReader> = match archive_type {
        ArchiveType::Rar => Box::new(RarReader::new(archive)),
        ArchiveType::SevenZip => Box::new(SevenZipReader::new(archive)),
        ArchiveType::Tar => Box::new(TarReader::new(archive, Compression::None)),
        ArchiveType::Gzip => Box::new(TarReader::new(archive, Compression::Gzip)),
        ArchiveType::Bzip2 => Box::new(TarReader::new(archive, Compression::Bzip2)),
        ArchiveType::Xz => Box::new(TarReader::new(archive, Compression::Xz)),
        ArchiveType::Zip => {
            return Err(Error::UnsupportedFormat {
                archive: archive.to_path_buf(),
                reason: "ZIP archives are extracted directly".to_string(),
            });
        }
    };
    Ok(reader)
}

pub(crate) fn unreadable(archive: &Path, what: &str, e: impl std::fmt::Display) -> Error {
    Error::UnsupportedFormat {
        archive: archive.to_path_buf(),
        reason: format!("{what}: {e}"),
    }
}
