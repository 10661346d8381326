//! Streaming HTTP downloads
//!
//! [`Downloader`] writes a single [`FileEntry`]'s response body to its
//! `local_file_path`, updating `downloaded_size` after every chunk. The
//! cancellation token is observed while waiting for the response and between
//! chunks; a chunk that is already being written completes first.


use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::types::{EntryStatus, FileEntry};
use chrono::Utc;
use futures::StreamExt;
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Build the HTTP client used for downloads from `config`
pub fn build_client(config: &DownloadConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.clone());
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(Error::Network)
}

/// Streams remote files to disk
#[derive(Clone, Debug)]
pub struct Downloader {
    client: reqwest::Client,
    config: DownloadConfig,
}

impl Downloader {
    /// Downloader with a client built from `config`
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    /// Downloader sharing an existing client
    pub fn with_client(client: reqwest::Client, config: DownloadConfig) -> Self {
        Self { client, config }
    }

    /// Settings this downloader was built with
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Download `entry` to its `local_file_path`
    ///
    /// The entry moves to Downloading, then to Downloaded on success, Cancelled
    /// when `cancel` fires, or Failed with `error_message` set. A failure that
    /// races with cancellation is reported as [`Error::Cancelled`].
    ///
    /// `on_progress` runs after every chunk on the transfer's own task and
    /// must not block. The partial file is removed on failure or cancellation
    /// unless `keep_partial_files` is set.
    pub async fn download<F>(
        &self,
        entry: &mut FileEntry,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<()>
    where
        F: FnMut(&FileEntry),
    {
        entry.downloaded_size = 0;
        entry.error_message = None;
        entry.start_time = Some(Utc::now());
        entry.end_time = None;
        entry.set_status(EntryStatus::Downloading);
        debug!(file = %entry.file_name, url = %entry.download_url, "starting download");

        let result = match self.fetch(entry, cancel, &mut on_progress).await {
            Err(e) if cancel.is_cancelled() && !e.is_cancelled() => {
                debug!(file = %entry.file_name, error = %e, "failure after cancellation");
                Err(Error::Cancelled)
            }
            other => other,
        };

        match &result {
            Ok(()) => {
                entry.set_status(EntryStatus::Downloaded);
                info!(
                    file = %entry.file_name,
                    bytes = entry.downloaded_size,
                    "download finished"
                );
            }
            Err(e) => {
                if !self.config.keep_partial_files {
                    remove_partial(&entry.local_file_path).await;
                }
                if e.is_cancelled() {
                    entry.set_status(EntryStatus::Cancelled);
                    info!(file = %entry.file_name, bytes = entry.downloaded_size, "download cancelled");
                } else {
                    entry.error_message = Some(e.to_string());
                    entry.set_status(EntryStatus::Failed);
                    warn!(file = %entry.file_name, error = %e, "download failed");
                }
            }
        }
        result
    }

    async fn fetch<F>(
        &self,
        entry: &mut FileEntry,
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&FileEntry),
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(parent) = entry.local_file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = entry.download_url.clone();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = self.client.get(&url).send() => {
                response.map_err(|e| transfer_error(&url, e))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        let content_length = response.content_length();
        if let Some(length) = content_length {
            entry.total_size = length;
        }

        let file = tokio::fs::File::create(&entry.local_file_path).await?;
        let mut writer = BufWriter::with_capacity(self.config.chunk_size, file);
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| transfer_error(&url, e))?;
            writer.write_all(&chunk).await?;

            entry.downloaded_size += chunk.len() as u64;
            // A descriptor size may undercount when the server sends no length
            if entry.downloaded_size > entry.total_size {
                entry.total_size = entry.downloaded_size;
            }
            on_progress(entry);
        }

        writer.flush().await?;
        if content_length.is_none() {
            entry.total_size = entry.downloaded_size;
        }
        Ok(())
    }
}

fn transfer_error(url: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{url}: {e}"))
    } else {
        Error::Network(e)
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove partial download"),
    }
}
