//! Fetch bundle example
//!
//! Downloads one or more URLs into `downloads/MockExams/<related id>` and
//! expands any archives in place, printing progress as it goes.
//!
//! ```bash
//! cargo run --example fetch_bundle -- 42 https://cdn.example.com/Homework1.zip
//! ```
//!
//! Set `BUNDLE_DL_CONFIG` to a JSON file to override the defaults. Press
//! Ctrl+C to cancel the task.

use bundle_dl::utils::format_size;
use bundle_dl::{Config, Event, RemoteFile, TaskKind, TaskOrchestrator, run_with_shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let related_id: i64 = args
        .next()
        .ok_or("usage: fetch_bundle <related id> <url>...")?
        .parse()?;
    let files: Vec<RemoteFile> = args.map(|url| RemoteFile::new("", url, 0)).collect();
    if files.is_empty() {
        return Err("at least one URL is required".into());
    }

    let config = match std::env::var_os("BUNDLE_DL_CONFIG") {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    let orchestrator = TaskOrchestrator::new(config)?;

    // Subscribe to events
    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::TaskStarted { task } => {
                    println!("▶ {} ({} files)", task.name, task.total_files());
                }
                Event::EntryProgress { entry, .. } => {
                    println!(
                        "⬇ {}: {:.1}% ({} / {}) @ {}/s",
                        entry.file_name,
                        entry.progress_percent(),
                        format_size(entry.downloaded_size),
                        format_size(entry.total_size),
                        format_size(entry.download_speed())
                    );
                }
                Event::EntryStatusChanged { entry, .. } => {
                    println!("• {}: {:?}", entry.file_name, entry.status);
                }
                Event::TaskCompleted { task } => {
                    println!("✓ {} complete, {} downloaded", task.name, format_size(task.downloaded_size()));
                }
                Event::TaskFailed { kind, error, .. } => {
                    println!("✗ Failed ({:?}): {}", kind, error);
                }
                Event::TaskCancelled { .. } => {
                    println!("⏹ Cancelled");
                }
                Event::TaskProgress { .. } => {}
            }
        }
    });

    let mut task = orchestrator.create_task("bundle", TaskKind::MockExam, related_id, files)?;
    let result = run_with_shutdown(&orchestrator, &mut task).await;

    println!("{}", task.status_message);
    if let Err(e) = result {
        if !e.is_cancelled() && e.is_retryable() {
            println!("The failure looks transient; run again to retry.");
        }
        return Err(e.into());
    }
    Ok(())
}
