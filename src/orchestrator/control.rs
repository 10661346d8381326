//! Task control: cancel, retry, archive cleanup.

use crate::error::{Error, Result};
use crate::types::{EntryStatus, Task, TaskId};

use super::TaskOrchestrator;

impl TaskOrchestrator {
    /// Cancel a running task
    ///
    /// The running [`run`](Self::run) call observes the token at its next
    /// chunk or entry boundary and finishes with the task Cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no task with this id is running.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use bundle_dl::*;
    /// # async fn example(orchestrator: TaskOrchestrator, id: TaskId) -> Result<()> {
    /// orchestrator.cancel(id).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let active_tasks = self.active_tasks.lock().await;
        let cancel_token = active_tasks
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("task {} is not running", id)))?;
        cancel_token.cancel();
        tracing::info!(task_id = id.0, "task cancellation requested");
        Ok(())
    }

    /// Whether a task with this id is currently running
    pub async fn is_running(&self, id: TaskId) -> bool {
        self.active_tasks.lock().await.contains_key(&id)
    }

    /// Retry a Failed or Cancelled task
    ///
    /// Only Failed and Cancelled entries are reset; Completed entries keep
    /// their progress and are not fetched again. The run gets a fresh
    /// cancellation token.
    pub async fn retry(&self, task: &mut Task) -> Result<()> {
        if !task.can_retry() {
            return Err(Error::Other(format!(
                "task {} cannot be retried while {:?}",
                task.id, task.status
            )));
        }

        let reset = task
            .entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Failed | EntryStatus::Cancelled))
            .count();
        task.reset_for_retry();
        task.status_message = "Retrying...".to_string();
        tracing::info!(task_id = task.id.0, reset_entries = reset, "retrying task");
        self.run(task).await
    }

    /// Delete the downloaded archives of completed compressed entries
    ///
    /// Returns the number of files removed. Files that are already gone are
    /// not counted and not an error.
    pub async fn cleanup_archives(&self, task: &Task) -> Result<usize> {
        let mut removed = 0;
        for entry in task
            .entries
            .iter()
            .filter(|e| e.is_compressed && e.status == EntryStatus::Completed)
        {
            match tokio::fs::remove_file(&entry.local_file_path).await {
                Ok(()) => {
                    tracing::debug!(file = %entry.file_name, "removed archive");
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(removed)
    }
}
