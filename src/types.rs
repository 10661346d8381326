//! Core types for bundle-dl

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Allocate a process-wide unique id
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// What a task's files belong to
///
/// Decides the folder the files are laid out under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Mock exam material
    MockExam,
    /// Online exam material
    OnlineExam,
    /// Comprehensive training material
    ComprehensiveTraining,
    /// Specialized training material
    SpecializedTraining,
}

impl TaskKind {
    /// Folder name under the base download path
    pub fn folder_name(&self) -> &'static str {
        match self {
            TaskKind::MockExam => "MockExams",
            TaskKind::OnlineExam => "OnlineExams",
            TaskKind::ComprehensiveTraining => "ComprehensiveTraining",
            TaskKind::SpecializedTraining => "SpecializedTraining",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskKind::MockExam => "Mock exam",
            TaskKind::OnlineExam => "Online exam",
            TaskKind::ComprehensiveTraining => "Comprehensive training",
            TaskKind::SpecializedTraining => "Specialized training",
        }
    }
}

/// Task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet started
    Pending,
    /// An entry is in flight
    Running,
    /// Every entry reached Completed
    Completed,
    /// An entry failed and the task stopped
    Failed,
    /// Cancellation was observed before completion
    Cancelled,
}

impl TaskStatus {
    /// True for Completed, Failed and Cancelled
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Per-file status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Not started
    Pending,
    /// Body is being streamed to disk
    Downloading,
    /// Body fully on disk
    Downloaded,
    /// Archive is being expanded
    Extracting,
    /// Done
    Completed,
    /// Download or extraction failed
    Failed,
    /// Cancelled while in flight
    Cancelled,
}

/// Archive type detected by file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    /// ZIP archive (.zip)
    Zip,
    /// RAR archive (.rar)
    Rar,
    /// 7-Zip archive (.7z)
    SevenZip,
    /// Plain tarball (.tar)
    Tar,
    /// Gzip stream (.gz), a tarball when the name contains ".tar"
    Gzip,
    /// Bzip2 stream (.bz2), a tarball when the name contains ".tar"
    Bzip2,
    /// XZ stream (.xz), a tarball when the name contains ".tar"
    Xz,
}

impl ArchiveType {
    /// Extensions treated as archives; anything else is a plain file
    pub const SUPPORTED_EXTENSIONS: [&'static str; 7] =
        ["zip", "rar", "7z", "tar", "gz", "bz2", "xz"];

    /// Detect the archive type from the final extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "zip" => Some(ArchiveType::Zip),
            "rar" => Some(ArchiveType::Rar),
            "7z" => Some(ArchiveType::SevenZip),
            "tar" => Some(ArchiveType::Tar),
            "gz" => Some(ArchiveType::Gzip),
            "bz2" => Some(ArchiveType::Bzip2),
            "xz" => Some(ArchiveType::Xz),
            _ => None,
        }
    }
}

/// Remote file descriptor supplied by the catalog service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// File name to store the download under
    pub file_name: String,
    /// Absolute URL of the file
    pub download_url: String,
    /// Advertised size in bytes (0 when unknown)
    #[serde(default)]
    pub total_size: u64,
    /// Optional MD5 (32 hex) or SHA-256 (64 hex) checksum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl RemoteFile {
    /// Descriptor without a checksum
    pub fn new(file_name: impl Into<String>, download_url: impl Into<String>, total_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            download_url: download_url.into(),
            total_size,
            checksum: None,
        }
    }

    /// Attach an expected checksum
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// One remote file to download and, when it is an archive, extract
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name on disk
    pub file_name: String,
    /// Source URL
    pub download_url: String,
    /// Where the body is written
    pub local_file_path: PathBuf,
    /// Destination directory for extraction
    pub extract_path: PathBuf,
    /// Size in bytes, from the descriptor or the Content-Length header
    pub total_size: u64,
    /// Bytes written so far
    pub downloaded_size: u64,
    /// Whether the entry is expanded after download
    pub is_compressed: bool,
    /// Detected archive type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_type: Option<ArchiveType>,
    /// Expected checksum
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Current status
    pub status: EntryStatus,
    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the download started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the entry reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl FileEntry {
    /// Build a pending entry for `remote` stored in `directory`
    pub fn new(remote: RemoteFile, directory: &Path, extract_path: PathBuf) -> Self {
        let local_file_path = directory.join(&remote.file_name);
        let archive_type = ArchiveType::from_path(&local_file_path);
        Self {
            file_name: remote.file_name,
            download_url: remote.download_url,
            local_file_path,
            extract_path,
            total_size: remote.total_size,
            downloaded_size: 0,
            is_compressed: archive_type.is_some(),
            archive_type,
            checksum: remote.checksum,
            status: EntryStatus::Pending,
            error_message: None,
            start_time: None,
            end_time: None,
        }
    }

    /// Download progress in percent (0.0 to 100.0)
    pub fn progress_percent(&self) -> f64 {
        if self.total_size == 0 {
            return match self.status {
                EntryStatus::Downloaded | EntryStatus::Extracting | EntryStatus::Completed => 100.0,
                _ => 0.0,
            };
        }
        (self.downloaded_size as f64 / self.total_size as f64 * 100.0).min(100.0)
    }

    /// Average transfer speed in bytes per second since the download started
    pub fn download_speed(&self) -> u64 {
        let Some(start) = self.start_time else {
            return 0;
        };
        let end = self.end_time.unwrap_or_else(Utc::now);
        let elapsed_ms = (end - start).num_milliseconds();
        if elapsed_ms <= 0 {
            return 0;
        }
        self.downloaded_size.saturating_mul(1000) / elapsed_ms as u64
    }

    /// Estimated time until the download finishes
    pub fn eta(&self) -> Option<Duration> {
        if self.status != EntryStatus::Downloading {
            return None;
        }
        let speed = self.download_speed();
        if speed == 0 || self.total_size == 0 {
            return None;
        }
        let remaining = self.total_size.saturating_sub(self.downloaded_size);
        Some(Duration::from_secs(remaining.div_ceil(speed)))
    }

    /// Move to `status`, stamping `end_time` for terminal statuses
    pub fn set_status(&mut self, status: EntryStatus) {
        self.status = status;
        if matches!(
            status,
            EntryStatus::Completed | EntryStatus::Failed | EntryStatus::Cancelled
        ) {
            self.end_time = Some(Utc::now());
        }
    }

    /// Clear progress so the entry can be fetched again
    pub fn reset_for_retry(&mut self) {
        self.status = EntryStatus::Pending;
        self.downloaded_size = 0;
        self.error_message = None;
        self.start_time = None;
        self.end_time = None;
    }
}

/// One user-initiated fetch request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    /// Task id
    pub id: TaskId,
    /// Display name
    pub name: String,
    /// What the files belong to
    pub kind: TaskKind,
    /// Id of the exam or training the files belong to
    pub related_id: i64,
    /// Files in download order
    pub entries: Vec<FileEntry>,
    /// Current status
    pub status: TaskStatus,
    /// Short human-readable status line
    pub status_message: String,
    /// Structured failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Classification of the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// When the task started running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the task reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl Task {
    /// Mean of the entries' progress (0.0 for a task without entries)
    pub fn overall_progress(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.entries.iter().map(FileEntry::progress_percent).sum();
        sum / self.entries.len() as f64
    }

    /// Number of entries
    pub fn total_files(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries in Completed
    pub fn completed_files(&self) -> usize {
        self.count_with(EntryStatus::Completed)
    }

    /// Number of entries in Failed
    pub fn failed_files(&self) -> usize {
        self.count_with(EntryStatus::Failed)
    }

    /// Sum of entry sizes
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.total_size).sum()
    }

    /// Sum of bytes written so far
    pub fn downloaded_size(&self) -> u64 {
        self.entries.iter().map(|e| e.downloaded_size).sum()
    }

    /// A running task can be cancelled
    pub fn can_cancel(&self) -> bool {
        self.status == TaskStatus::Running
    }

    /// A failed or cancelled task can be retried
    pub fn can_retry(&self) -> bool {
        matches!(self.status, TaskStatus::Failed | TaskStatus::Cancelled)
    }

    /// Return to Pending, resetting only Failed and Cancelled entries
    ///
    /// Completed entries keep their progress and are skipped by the next run.
    pub fn reset_for_retry(&mut self) {
        for entry in &mut self.entries {
            if matches!(entry.status, EntryStatus::Failed | EntryStatus::Cancelled) {
                entry.reset_for_retry();
            }
        }
        self.status = TaskStatus::Pending;
        self.error_message = None;
        self.error_kind = None;
        self.start_time = None;
        self.end_time = None;
    }

    fn count_with(&self, status: EntryStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }
}

/// Event emitted during the task lifecycle
///
/// Every payload is an owned snapshot; mutating the task afterwards does not
/// affect events already sent.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task moved to Running
    TaskStarted {
        /// Task snapshot
        task: Task,
    },

    /// Task-level progress after a chunk or entry transition
    TaskProgress {
        /// Task snapshot
        task: Task,
    },

    /// Entry received a chunk
    EntryProgress {
        /// Owning task
        task_id: TaskId,
        /// Entry snapshot
        entry: FileEntry,
    },

    /// Entry changed status
    EntryStatusChanged {
        /// Owning task
        task_id: TaskId,
        /// Entry snapshot
        entry: FileEntry,
    },

    /// Every entry completed
    TaskCompleted {
        /// Task snapshot
        task: Task,
    },

    /// Task stopped on an error
    TaskFailed {
        /// Task snapshot
        task: Task,
        /// Error classification
        kind: ErrorKind,
        /// Error message
        error: String,
    },

    /// Task stopped on cancellation
    TaskCancelled {
        /// Task snapshot
        task: Task,
    },
}
