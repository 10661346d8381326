//! Running a task: pre-flight space check, then download, verify and extract
//! each entry in order.

use crate::error::{Error, ErrorKind, Result};
use crate::extraction::{ExtractOptions, extract_archive};
use crate::integrity::verify_checksum;
use crate::space::SpaceGuard;
use crate::types::{EntryStatus, Event, Task, TaskId, TaskStatus};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::TaskOrchestrator;

impl TaskOrchestrator {
    /// Run `task` until every entry is Completed or the first failure
    ///
    /// The task moves to Running, then to Completed, Failed or Cancelled.
    /// Entries that are already Completed are skipped. The first failing or
    /// cancelled entry stops the task; entries after it keep their status.
    /// Disk space is checked once, before any request is made.
    ///
    /// Progress is published on [`subscribe`](Self::subscribe) as owned
    /// snapshots. A fresh cancellation token is issued for every run, so
    /// [`cancel`](Self::cancel) only affects the run in progress.
    pub async fn run(&self, task: &mut Task) -> Result<()> {
        let cancel = self.register(task.id).await?;

        let result = self.drive(task, &cancel).await;
        // A failure that races with cancellation is reported as the cancellation
        let result = match result {
            Err(e) if cancel.is_cancelled() && !e.is_cancelled() => {
                tracing::debug!(task_id = task.id.0, error = %e, "failure after cancellation");
                Err(Error::Cancelled)
            }
            other => other,
        };

        self.active_tasks.lock().await.remove(&task.id);
        self.finish(task, result)
    }

    async fn register(&self, id: TaskId) -> Result<CancellationToken> {
        let mut active_tasks = self.active_tasks.lock().await;
        if active_tasks.contains_key(&id) {
            return Err(Error::Other(format!("task {} is already running", id)));
        }
        let cancel = CancellationToken::new();
        active_tasks.insert(id, cancel.clone());
        Ok(cancel)
    }

    async fn drive(&self, task: &mut Task, cancel: &CancellationToken) -> Result<()> {
        task.status = TaskStatus::Running;
        task.status_message = "Preparing download...".to_string();
        task.error_message = None;
        task.error_kind = None;
        task.start_time = Some(Utc::now());
        task.end_time = None;
        self.emit_event(Event::TaskStarted { task: task.clone() });
        tracing::info!(
            task_id = task.id.0,
            name = %task.name,
            files = task.entries.len(),
            "task started"
        );

        // Completed entries are already on disk
        let payload: u64 = task
            .entries
            .iter()
            .filter(|e| e.status != EntryStatus::Completed)
            .map(|e| e.total_size)
            .sum();
        let directory = self.download_directory(task.kind, task.related_id);
        if let Err(e) = SpaceGuard::new(&self.config.disk_space, self.space_probe.as_ref())
            .ensure(payload, &directory)
        {
            task.status_message = "Insufficient disk space".to_string();
            return Err(e);
        }

        for index in 0..task.entries.len() {
            if task.entries[index].status == EntryStatus::Completed {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.process_entry(task, index, cancel).await?;
        }

        if self.config.extraction.delete_archives_after_extraction {
            match self.cleanup_archives(task).await {
                Ok(removed) => tracing::debug!(task_id = task.id.0, removed, "removed archives"),
                Err(e) => tracing::warn!(task_id = task.id.0, error = %e, "archive cleanup failed"),
            }
        }
        Ok(())
    }

    /// Download, verify and extract one entry
    async fn process_entry(
        &self,
        task: &mut Task,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let task_id = task.id;
        let mut entry = task.entries[index].clone();
        let file_name = entry.file_name.clone();

        task.status_message = format!("Downloading {}...", file_name);
        entry.status = EntryStatus::Downloading;
        task.entries[index] = entry.clone();
        self.emit_entry_changed(task, index);

        // Snapshot updated per chunk; `task` itself is written back once the transfer ends
        let mut snapshot = task.clone();
        let downloaded = self
            .downloader
            .download(&mut entry, cancel, |progress| {
                snapshot.entries[index] = progress.clone();
                self.emit_event(Event::EntryProgress {
                    task_id,
                    entry: progress.clone(),
                });
                self.emit_event(Event::TaskProgress {
                    task: snapshot.clone(),
                });
            })
            .await;
        task.entries[index] = entry;
        self.emit_entry_changed(task, index);
        if let Err(e) = downloaded {
            if !e.is_cancelled() {
                task.status_message = format!("Download failed: {}", file_name);
                task.error_message = Some(format!("downloading {}: {}", file_name, e));
            }
            return Err(e);
        }

        if let Err(e) = self.verify_entry(task, index).await {
            let e = self.settle_entry(task, index, e, cancel);
            if !e.is_cancelled() {
                task.status_message = format!("Download failed: {}", file_name);
                task.error_message = Some(format!("verifying {}: {}", file_name, e));
            }
            return Err(e);
        }

        if task.entries[index].is_compressed {
            task.status_message = format!("Extracting {}...", file_name);
            task.entries[index].set_status(EntryStatus::Extracting);
            self.emit_entry_changed(task, index);

            let entry = &task.entries[index];
            let extracted = extract_archive(
                &entry.local_file_path,
                &entry.extract_path,
                ExtractOptions::from(&self.config.extraction),
                cancel.clone(),
            )
            .await;

            match extracted {
                Ok(report) => tracing::info!(
                    task_id = task_id.0,
                    file = %file_name,
                    files = report.files.len(),
                    skipped_prefix = report.skipped_prefix.as_deref().unwrap_or(""),
                    "entry extracted"
                ),
                Err(e) => {
                    let e = self.settle_entry(task, index, e, cancel);
                    if !e.is_cancelled() {
                        task.status_message = format!("Extraction failed: {}", file_name);
                        task.error_message = Some(format!("extracting {}: {}", file_name, e));
                    }
                    return Err(e);
                }
            }
        }

        task.entries[index].set_status(EntryStatus::Completed);
        self.emit_entry_changed(task, index);
        tracing::info!(task_id = task_id.0, file = %file_name, "entry completed");
        Ok(())
    }

    async fn verify_entry(&self, task: &Task, index: usize) -> Result<()> {
        let entry = &task.entries[index];
        let Some(expected) = entry.checksum.clone() else {
            return Ok(());
        };
        if !self.config.download.verify_checksums {
            return Ok(());
        }

        let path = entry.local_file_path.clone();
        let file_name = entry.file_name.clone();
        tokio::task::spawn_blocking(move || verify_checksum(&path, &file_name, &expected))
            .await
            .map_err(|e| Error::Other(format!("checksum task panicked: {}", e)))?
    }

    /// Record a post-download failure on the entry, giving cancellation precedence
    fn settle_entry(
        &self,
        task: &mut Task,
        index: usize,
        error: Error,
        cancel: &CancellationToken,
    ) -> Error {
        let error = if cancel.is_cancelled() {
            Error::Cancelled
        } else {
            error
        };
        let entry = &mut task.entries[index];
        if error.is_cancelled() {
            entry.set_status(EntryStatus::Cancelled);
        } else {
            if error.kind() == ErrorKind::Integrity
                && !self.config.download.keep_partial_files
                && let Err(e) = std::fs::remove_file(&entry.local_file_path)
            {
                tracing::warn!(file = %entry.file_name, error = %e, "failed to remove corrupt download");
            }
            entry.error_message = Some(error.to_string());
            entry.set_status(EntryStatus::Failed);
        }
        self.emit_entry_changed(task, index);
        error
    }

    fn emit_entry_changed(&self, task: &Task, index: usize) {
        self.emit_event(Event::EntryStatusChanged {
            task_id: task.id,
            entry: task.entries[index].clone(),
        });
        self.emit_event(Event::TaskProgress { task: task.clone() });
    }

    /// Apply the final status and publish the terminal event
    fn finish(&self, task: &mut Task, result: Result<()>) -> Result<()> {
        task.end_time = Some(Utc::now());

        match &result {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                task.status_message = "Download complete".to_string();
                tracing::info!(task_id = task.id.0, files = task.entries.len(), "task completed");
                self.emit_event(Event::TaskCompleted { task: task.clone() });
            }
            Err(e) if e.is_cancelled() => {
                task.status = TaskStatus::Cancelled;
                task.status_message = "Download cancelled".to_string();
                task.error_message = None;
                task.error_kind = Some(ErrorKind::Cancelled);
                // An entry still marked in flight stopped with the task
                for entry in &mut task.entries {
                    if matches!(
                        entry.status,
                        EntryStatus::Downloading | EntryStatus::Downloaded | EntryStatus::Extracting
                    ) {
                        entry.set_status(EntryStatus::Cancelled);
                    }
                }
                tracing::info!(task_id = task.id.0, "task cancelled");
                self.emit_event(Event::TaskCancelled { task: task.clone() });
            }
            Err(e) => {
                task.status = TaskStatus::Failed;
                // Entry failures already carry the file name and phase
                let message = task.error_message.get_or_insert_with(|| e.to_string()).clone();
                task.error_kind = Some(e.kind());
                tracing::error!(
                    task_id = task.id.0,
                    kind = ?e.kind(),
                    error = %message,
                    "task failed"
                );
                self.emit_event(Event::TaskFailed {
                    task: task.clone(),
                    kind: e.kind(),
                    error: message,
                });
            }
        }
        result
    }
}
