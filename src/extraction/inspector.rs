//! Wrapper-directory detection
//!
//! Archive authors often nest every entry under one directory named after the
//! archive (`Homework1.zip` → `Homework1/...`). Before extracting, the entry
//! list is inspected and, when all entries share one root directory that is
//! similar to the archive's base name, that directory becomes the skip prefix.

use crate::similarity::NameSimilarityMatcher;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use super::reader::ArchiveEntry;

/// Compound suffixes stripped as a unit when deriving an archive's base name
const COMPOUND_SUFFIXES: [&str; 3] = [".tar.gz", ".tar.bz2", ".tar.xz"];

/// Outcome of the flattening decision for one archive
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlattenPlan {
    skip_prefix: Option<String>,
}

impl FlattenPlan {
    /// Keep the archive's structure verbatim
    pub fn preserve() -> Self {
        Self::default()
    }

    /// Strip `prefix/` from every entry path
    pub fn strip(prefix: impl Into<String>) -> Self {
        Self {
            skip_prefix: Some(prefix.into()),
        }
    }

    /// The root segment being removed, if any
    pub fn skip_prefix(&self) -> Option<&str> {
        self.skip_prefix.as_deref()
    }

    /// Destination-relative path for a raw entry path
    ///
    /// Returns `None` when nothing is left to write: empty paths, or the
    /// wrapper directory entry itself.
    pub fn relative_path(&self, raw: &str) -> Option<String> {
        let path = normalize_entry_path(raw);
        if path.is_empty() {
            return None;
        }
        let Some(prefix) = self.skip_prefix.as_deref() else {
            return Some(path);
        };
        if path == prefix {
            return None;
        }
        match path.strip_prefix(prefix).and_then(|rest| rest.strip_prefix('/')) {
            Some(rest) => Some(rest.to_string()),
            None => Some(path),
        }
    }
}

/// Normalize separators to `/` and drop empty and `.` segments
///
/// This also trims leading and trailing separators.
pub fn normalize_entry_path(raw: &str) -> String {
    raw.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Distinct first segments across all entries
pub fn root_segments(entries: &[ArchiveEntry]) -> BTreeSet<String> {
    entries
        .iter()
        .filter_map(|entry| {
            let path = normalize_entry_path(&entry.path);
            path.split('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .collect()
}

/// Archive file name without its extension
///
/// `Homework1.zip` → `Homework1`, `Bundle.tar.gz` → `Bundle`.
pub fn archive_base_name(archive: &Path) -> String {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let lower = name.to_lowercase();
    for suffix in COMPOUND_SUFFIXES {
        if lower.ends_with(suffix)
            && let Some(stem) = name.get(..name.len().saturating_sub(suffix.len()))
            && !stem.is_empty()
        {
            return stem.to_string();
        }
    }
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Decide whether to strip a single wrapper directory from `entries`
pub fn plan_flatten(
    archive: &Path,
    entries: &[ArchiveEntry],
    matcher: &NameSimilarityMatcher,
) -> FlattenPlan {
    let roots = root_segments(entries);
    if roots.len() != 1 {
        debug!(archive = %archive.display(), roots = roots.len(), "not flattening: root count");
        return FlattenPlan::preserve();
    }
    let Some(root) = roots.into_iter().next() else {
        return FlattenPlan::preserve();
    };

    // A lone file at the top level is content, not a wrapper
    let root_is_file = entries
        .iter()
        .any(|e| !e.is_dir && normalize_entry_path(&e.path) == root);
    if root_is_file {
        return FlattenPlan::preserve();
    }

    let base = archive_base_name(archive);
    if matcher.is_similar(&root, &base) {
        debug!(archive = %archive.display(), %root, "flattening wrapper directory");
        FlattenPlan::strip(root)
    } else {
        debug!(archive = %archive.display(), %root, %base, "not flattening: unrelated root");
        FlattenPlan::preserve()
    }
}
