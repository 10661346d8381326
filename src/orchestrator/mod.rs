//! Task orchestration split into focused submodules.
//!
//! The `TaskOrchestrator` struct and its methods are organized by domain:
//! - [`run`] - Driving a task through download, verification and extraction
//! - [`control`] - Cancel, retry and archive cleanup

mod control;
mod run;


use crate::config::Config;
use crate::downloader::{Downloader, build_client};
use crate::error::{Error, Result};
use crate::extraction::archive_base_name;
use crate::space::{FsSpaceProbe, SpaceProbe};
use crate::types::{Event, FileEntry, RemoteFile, Task, TaskId, TaskKind, TaskStatus};
use crate::utils::{file_name_from_url, sanitize_file_name};
use std::path::{Path, PathBuf};

/// Drives tasks through download and extraction (cloneable - all fields are Arc-wrapped)
///
/// Entries of one task run sequentially. Separate tasks may run concurrently
/// on clones of the same orchestrator as long as they target different
/// directories.
#[derive(Clone)]
pub struct TaskOrchestrator {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// HTTP downloader sharing one connection pool
    pub(crate) downloader: Downloader,
    /// Free-space source for the pre-flight check
    pub(crate) space_probe: std::sync::Arc<dyn SpaceProbe>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Map of running tasks to their cancellation tokens
    pub(crate) active_tasks: std::sync::Arc<
        tokio::sync::Mutex<
            std::collections::HashMap<TaskId, tokio_util::sync::CancellationToken>,
        >,
    >,
}

impl TaskOrchestrator {
    /// Create an orchestrator with an HTTP client built from `config.download`
    pub fn new(config: Config) -> Result<Self> {
        let client = build_client(&config.download)?;
        Self::with_client(config, client)
    }

    /// Create an orchestrator around an existing HTTP client
    pub fn with_client(config: Config, client: reqwest::Client) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(config.event_channel_capacity);
        let downloader = Downloader::with_client(client, config.download.clone());

        Ok(Self {
            config: std::sync::Arc::new(config),
            downloader,
            space_probe: std::sync::Arc::new(FsSpaceProbe),
            event_tx,
            active_tasks: std::sync::Arc::new(tokio::sync::Mutex::new(
                std::collections::HashMap::new(),
            )),
        })
    }

    /// Replace the free-space source used by the pre-flight check
    pub fn with_space_probe(mut self, probe: std::sync::Arc<dyn SpaceProbe>) -> Self {
        self.space_probe = probe;
        self
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to task events
    ///
    /// Multiple subscribers are supported. A subscriber that falls more than
    /// `event_channel_capacity` events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Directory a task's files are stored in:
    /// `{base_download_path}/{kind folder}/{related_id}`
    pub fn download_directory(&self, kind: TaskKind, related_id: i64) -> PathBuf {
        self.config
            .base_download_path()
            .join(kind.folder_name())
            .join(related_id.to_string())
    }

    /// Build a pending task for `files`, in the given order
    ///
    /// A blank file name falls back to the last segment of the download URL.
    /// Names that would leave the task directory are rejected.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use bundle_dl::*;
    /// # fn example(orchestrator: TaskOrchestrator) -> Result<()> {
    /// let task = orchestrator.create_task(
    ///     "Week 3 mock exam",
    ///     TaskKind::MockExam,
    ///     12,
    ///     vec![RemoteFile::new("Homework1.zip", "https://cdn.example.com/h1.zip", 1_048_576)],
    /// )?;
    /// assert_eq!(task.total_files(), 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_task(
        &self,
        name: impl Into<String>,
        kind: TaskKind,
        related_id: i64,
        files: Vec<RemoteFile>,
    ) -> Result<Task> {
        let directory = self.download_directory(kind, related_id);

        let entries = files
            .into_iter()
            .map(|mut remote| -> Result<FileEntry> {
                let file_name = if remote.file_name.trim().is_empty() {
                    file_name_from_url(&remote.download_url)
                } else {
                    sanitize_file_name(&remote.file_name)
                };
                remote.file_name = file_name.ok_or_else(|| {
                    Error::config(
                        format!(
                            "invalid file name '{}' for {}",
                            remote.file_name, remote.download_url
                        ),
                        "file_name",
                    )
                })?;
                let extract_path = self.extract_path_for(&directory, &remote.file_name);
                Ok(FileEntry::new(remote, &directory, extract_path))
            })
            .collect::<Result<Vec<_>>>()?;

        let task = Task {
            id: TaskId::next(),
            name: name.into(),
            kind,
            related_id,
            entries,
            status: TaskStatus::Pending,
            status_message: String::new(),
            error_message: None,
            error_kind: None,
            start_time: None,
            end_time: None,
        };

        tracing::debug!(
            task_id = task.id.0,
            kind = ?kind,
            related_id,
            files = task.entries.len(),
            directory = %directory.display(),
            "created task"
        );
        Ok(task)
    }

    fn extract_path_for(&self, directory: &Path, file_name: &str) -> PathBuf {
        if self.config.extraction.extract_into_subfolder
            && crate::types::ArchiveType::from_path(Path::new(file_name)).is_some()
        {
            directory.join(archive_base_name(Path::new(file_name)))
        } else {
            directory.to_path_buf()
        }
    }
}
