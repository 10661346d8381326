//! Configuration types for bundle-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for [`TaskOrchestrator`](crate::TaskOrchestrator)
///
/// Every field has a serde default, so an empty JSON object deserializes to
/// [`Config::default()`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings (paths, chunking, HTTP client)
    #[serde(default)]
    pub download: DownloadConfig,

    /// Pre-flight free space check
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// Archive extraction and wrapper-directory flattening
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download: DownloadConfig::default(),
            disk_space: DiskSpaceConfig::default(),
            extraction: ExtractionConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl Config {
    /// Parse a JSON document and validate the result
    ///
    /// Missing fields take their defaults. Malformed JSON is
    /// [`Error::Serialization`]; out-of-range values are [`Error::Config`].
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Base directory downloads are laid out under
    pub fn base_download_path(&self) -> &PathBuf {
        &self.download.base_download_path
    }

    /// Reject settings that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if self.download.chunk_size == 0 {
            return Err(Error::config("chunk size must be non-zero", "chunk_size"));
        }
        let multiplier = self.disk_space.size_multiplier;
        if multiplier.is_nan() || multiplier <= 0.0 {
            return Err(Error::config(
                "size multiplier must be positive",
                "size_multiplier",
            ));
        }
        let threshold = self.extraction.similarity_threshold;
        if threshold.is_nan() || threshold <= 0.0 || threshold > 1.0 {
            return Err(Error::config(
                format!("similarity threshold {threshold} is outside (0, 1]"),
                "similarity_threshold",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config(
                "event channel capacity must be non-zero",
                "event_channel_capacity",
            ));
        }
        Ok(())
    }
}

/// Download behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root of the download tree (default: "./downloads")
    ///
    /// Files land in `{base_download_path}/{task kind folder}/{related id}/{file name}`.
    #[serde(default = "default_base_download_path")]
    pub base_download_path: PathBuf,

    /// Bytes buffered before each write in the copy loop (default: 64 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// TCP connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Whole-request timeout (None = no deadline)
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Keep the partially written file when a download is cancelled or fails (default: false)
    #[serde(default)]
    pub keep_partial_files: bool,

    /// Validate downloads against a supplied checksum (default: true)
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_download_path: default_base_download_path(),
            chunk_size: default_chunk_size(),
            connect_timeout: default_connect_timeout(),
            request_timeout: None,
            user_agent: default_user_agent(),
            keep_partial_files: false,
            verify_checksums: true,
        }
    }
}

/// Disk space checking configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Multiplier applied to the task's total payload (default: 2.0)
    ///
    /// Covers the downloaded archive plus its extracted copy.
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: f64,

    /// Extra free space to keep on top of the multiplied payload (default: 0)
    #[serde(default)]
    pub min_free_space: u64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size_multiplier: 2.0,
            min_free_space: 0,
        }
    }
}

/// Archive extraction configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Strip a single top-level directory named like the archive (default: true)
    #[serde(default = "default_true")]
    pub flatten_single_root: bool,

    /// Minimum similarity ratio for the wrapper-name match (default: 0.7)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Extract into `{dir}/{archive stem}` instead of next to the archive (default: false)
    #[serde(default)]
    pub extract_into_subfolder: bool,

    /// Delete archive files once a task completes (default: false)
    #[serde(default)]
    pub delete_archives_after_extraction: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            flatten_single_root: true,
            similarity_threshold: default_similarity_threshold(),
            extract_into_subfolder: false,
            delete_archives_after_extraction: false,
        }
    }
}

fn default_base_download_path() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("bundle-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_size_multiplier() -> f64 {
    2.0
}

fn default_similarity_threshold() -> f64 {
    crate::similarity::SIMILARITY_THRESHOLD
}

fn default_event_channel_capacity() -> usize {
    1000
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
