//! Pre-flight free space check
//!
//! A task reserves `total payload × size_multiplier + min_free_space` bytes on
//! the destination volume before any request is made. The default multiplier
//! of 2.0 covers the downloaded archives plus their extracted copies.

use crate::config::DiskSpaceConfig;
use crate::error::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Source of free-space figures for a path
///
/// The default implementation asks the filesystem; tests inject fixed values.
pub trait SpaceProbe: Send + Sync {
    /// Bytes available to the current user on the volume holding `path`
    fn available_space(&self, path: &Path) -> std::io::Result<u64>;
}

/// [`SpaceProbe`] backed by statvfs / GetDiskFreeSpaceExW
#[derive(Clone, Copy, Debug, Default)]
pub struct FsSpaceProbe;

impl SpaceProbe for FsSpaceProbe {
    fn available_space(&self, path: &Path) -> std::io::Result<u64> {
        crate::utils::get_available_space(path)
    }
}

/// Checks a destination volume against a task's payload
pub struct SpaceGuard<'a> {
    config: &'a DiskSpaceConfig,
    probe: &'a dyn SpaceProbe,
}

impl<'a> SpaceGuard<'a> {
    /// Guard using `config`'s multiplier and buffer
    pub fn new(config: &'a DiskSpaceConfig, probe: &'a dyn SpaceProbe) -> Self {
        Self { config, probe }
    }

    /// Bytes to reserve for a payload of `payload_bytes`
    pub fn required_for(&self, payload_bytes: u64) -> u64 {
        let scaled = (payload_bytes as f64 * self.config.size_multiplier).ceil() as u64;
        scaled.saturating_add(self.config.min_free_space)
    }

    /// Fail with [`Error::InsufficientSpace`] unless the volume holding
    /// `destination` has room for `payload_bytes`
    ///
    /// `destination` need not exist yet; the nearest existing ancestor is
    /// checked instead. Passing with exactly the required amount free is allowed.
    pub fn ensure(&self, payload_bytes: u64, destination: &Path) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let required = self.required_for(payload_bytes);
        let check_path = nearest_existing_ancestor(destination).ok_or_else(|| {
            Error::DiskSpaceCheckFailed(format!(
                "no existing ancestor of '{}'",
                destination.display()
            ))
        })?;

        let available = self.probe.available_space(check_path).map_err(|e| {
            Error::DiskSpaceCheckFailed(format!(
                "Failed to check disk space for '{}': {}",
                check_path.display(),
                e
            ))
        })?;

        debug!(
            path = %check_path.display(),
            required,
            available,
            "disk space check"
        );

        if available < required {
            return Err(Error::InsufficientSpace {
                required,
                available,
            });
        }

        Ok(())
    }
}

fn nearest_existing_ancestor(path: &Path) -> Option<&Path> {
    if path.as_os_str().is_empty() {
        return Some(Path::new("."));
    }
    let found = path.ancestors().find(|p| !p.as_os_str().is_empty() && p.exists());
    // A bare relative path like "downloads" has only itself and "" as ancestors
    found.or_else(|| path.is_relative().then_some(Path::new(".")))
}
