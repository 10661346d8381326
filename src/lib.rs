//! # bundle-dl
//!
//! Fetch remote file bundles over HTTP and expand archives in place.
//!
//! ## Overview
//!
//! A [`Task`] is an ordered list of [`FileEntry`] records. The
//! [`TaskOrchestrator`] checks free space once, then for each entry in turn:
//! - streams the body to `{base}/{kind folder}/{related id}/{file name}`
//! - verifies an optional MD5 or SHA-256 checksum
//! - extracts `.zip .rar .7z .tar .gz .bz2 .xz` archives next to the download,
//!   dropping a single top-level folder that is named like the archive
//!
//! The first failing or cancelled entry stops the task. Failed and cancelled
//! tasks can be retried; completed entries are not fetched again.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bundle_dl::{Config, RemoteFile, TaskKind, TaskOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.base_download_path = "/var/lib/bundles".into();
//!
//!     let orchestrator = TaskOrchestrator::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let mut task = orchestrator.create_task(
//!         "Week 3 mock exam",
//!         TaskKind::MockExam,
//!         12,
//!         vec![RemoteFile::new("Homework1.zip", "https://cdn.example.com/h1.zip", 1_048_576)],
//!     )?;
//!     orchestrator.run(&mut task).await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Streaming HTTP downloads
pub mod downloader;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Checksum validation
pub mod integrity;
/// Task orchestration (decomposed into focused submodules)
pub mod orchestrator;
/// Archive name matching for wrapper-folder detection
pub mod similarity;
/// Pre-flight disk space check
pub mod space;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, DiskSpaceConfig, DownloadConfig, ExtractionConfig};
pub use downloader::Downloader;
pub use error::{Error, ErrorKind, Result};
pub use extraction::{ExtractOptions, ExtractionReport, extract_archive};
pub use orchestrator::TaskOrchestrator;
pub use similarity::NameSimilarityMatcher;
pub use space::{FsSpaceProbe, SpaceGuard, SpaceProbe};
pub use types::{
    ArchiveType, EntryStatus, Event, FileEntry, RemoteFile, Task, TaskId, TaskKind, TaskStatus,
};

/// Run a task, cancelling it when a termination signal arrives.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// A signal makes the task finish as Cancelled at its next chunk or entry
/// boundary; the result of the run is returned either way.
///
/// # Example
///
/// ```no_run
/// use bundle_dl::{Config, TaskKind, TaskOrchestrator, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = TaskOrchestrator::new(Config::default())?;
///     let mut task = orchestrator.create_task("bundle", TaskKind::OnlineExam, 1, vec![])?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(&orchestrator, &mut task).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: &TaskOrchestrator, task: &mut Task) -> Result<()> {
    let id = task.id;
    let run = orchestrator.run(task);
    tokio::pin!(run);

    tokio::select! {
        biased;
        result = &mut run => return result,
        _ = wait_for_signal() => {
            if let Err(e) = orchestrator.cancel(id).await {
                tracing::warn!(task_id = id.0, error = %e, "could not cancel task on shutdown");
            }
        }
    }
    run.await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "shutdown signal received"),
                _ = sigint.recv() => tracing::info!(signal = "SIGINT", "shutdown signal received"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "could not register both signal handlers");
            only.recv().await;
            tracing::info!("shutdown signal received");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register signal handlers, using ctrl_c fallback");
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl_c", "shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            // Without a signal source the task runs to completion
            std::future::pending::<()>().await;
        }
    }
}
