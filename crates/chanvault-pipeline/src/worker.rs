//! Single-lane transfer worker.
//!
//! Exactly one file is in flight at a time: the worker claims the oldest
//! QUEUED file with an atomic conditional update, stages the download on
//! local disk, verifies the byte count, and uploads to the derived
//! bucket/key before claiming the next. Transient source and storage
//! errors are retried within the claim with capped exponential backoff;
//! rejections and size mismatches fail the file immediately with the
//! reason recorded for the operator.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::mpsc;

use chanvault_core::models::{FileRecord, FileStatus};
use chanvault_core::retry::RetryPolicy;
use chanvault_db::FileStore;
use chanvault_source::{MessageSource, SourceError};
use chanvault_storage::keys::sanitize_filename;
use chanvault_storage::{ObjectSink, StorageError};

use crate::auth::AuthFlow;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub staging_dir: PathBuf,
    pub retry: RetryPolicy,
}

/// Classified failure of a single download or upload operation.
enum TransferError {
    /// Worth retrying within the claim. Carries the source-mandated
    /// cooldown when there is one.
    Transient {
        reason: String,
        cooldown: Option<Duration>,
    },
    /// Rejection; the file fails immediately.
    Fatal { reason: String },
    /// Session expired. The file keeps its claim and the pipeline pauses.
    AuthRequired,
}

impl From<SourceError> for TransferError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::AuthRequired => TransferError::AuthRequired,
            SourceError::RateLimited { cooldown } => TransferError::Transient {
                reason: e.to_string(),
                cooldown: Some(cooldown),
            },
            ref err if err.is_transient() => TransferError::Transient {
                reason: e.to_string(),
                cooldown: None,
            },
            _ => TransferError::Fatal {
                reason: e.to_string(),
            },
        }
    }
}

impl From<StorageError> for TransferError {
    fn from(e: StorageError) -> Self {
        if e.is_transient() {
            TransferError::Transient {
                reason: e.to_string(),
                cooldown: None,
            }
        } else {
            TransferError::Fatal {
                reason: e.to_string(),
            }
        }
    }
}

/// How a claimed transfer ended.
enum TransferEnd {
    Completed { retries: u32 },
    Failed { retries: u32, reason: String },
    /// Session expired mid-transfer; `from` is the phase the file was in.
    AuthExpired { from: FileStatus },
}

pub struct Worker {
    files: Arc<dyn FileStore>,
    sink: Arc<dyn ObjectSink>,
    source: Arc<dyn MessageSource>,
    auth: Arc<AuthFlow>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        files: Arc<dyn FileStore>,
        sink: Arc<dyn ObjectSink>,
        source: Arc<dyn MessageSource>,
        auth: Arc<AuthFlow>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            files,
            sink,
            source,
            auth,
            config,
        }
    }

    /// Poll loop. Drains the queue one file at a time until a shutdown
    /// signal arrives; the in-progress transfer finishes before exit.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            staging_dir = %self.config.staging_dir.display(),
            "Transfer worker started"
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.auth.is_ready().await {
                        continue;
                    }
                    loop {
                        match self.process_next().await {
                            Ok(true) => continue,
                            Ok(false) => break,
                            Err(e) => {
                                tracing::error!(error = %e, "Transfer worker iteration failed");
                                break;
                            }
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Transfer worker shutting down");
                    break;
                }
            }
        }
    }

    /// Claim and process one file. Returns true when a file was claimed,
    /// false when the queue is empty or the pipeline must pause.
    pub async fn process_next(&self) -> Result<bool> {
        let Some(file) = self.files.claim_next().await? else {
            return Ok(false);
        };

        tracing::info!(
            file_id = file.id,
            channel_id = file.channel_id,
            message_id = file.message_id,
            file_name = %file.file_name,
            size = file.file_size,
            "Claimed file for transfer"
        );

        let staging = self.staging_path(&file);
        let end = match self.transfer(&file, &staging).await {
            Ok(end) => end,
            Err(e) => {
                // A store error mid-transfer must not leave the file holding
                // the claim: clean the staging file and put the file back on
                // the queue so the lane keeps moving.
                remove_staging(&staging).await;
                if let Err(release) = self.release_claim(file.id).await {
                    tracing::error!(
                        file_id = file.id,
                        error = %release,
                        "Failed to release claim after store error"
                    );
                }
                return Err(e);
            }
        };

        match end {
            TransferEnd::Completed { retries } => {
                remove_staging(&staging).await;
                if retries > 0 {
                    self.files.record_attempts(file.id, retries as i32).await?;
                }
                tracing::info!(
                    file_id = file.id,
                    bucket = %file.bucket,
                    object_key = %file.object_key,
                    retries,
                    "Transfer completed"
                );
                Ok(true)
            }
            TransferEnd::Failed { retries, reason } => {
                remove_staging(&staging).await;
                if retries > 0 {
                    self.files.record_attempts(file.id, retries as i32).await?;
                }
                self.files.mark_failed(file.id, &reason).await?;
                tracing::warn!(file_id = file.id, reason = %reason, "Transfer failed");
                Ok(true)
            }
            TransferEnd::AuthExpired { from } => {
                // Release the claim so the queue is not blocked once the
                // operator re-authenticates. Not a failure of the file.
                remove_staging(&staging).await;
                self.files
                    .transition(file.id, from, FileStatus::Queued)
                    .await
                    .context("Failed to release claim after session expiry")?;
                self.auth.mark_expired().await;
                Ok(false)
            }
        }
    }

    /// Re-queue a file that is still marked in flight.
    async fn release_claim(&self, file_id: i64) -> Result<()> {
        if let Some(current) = self.files.get(file_id).await? {
            if current.status.is_in_flight() {
                self.files
                    .transition(file_id, current.status, FileStatus::Queued)
                    .await?;
            }
        }
        Ok(())
    }

    async fn transfer(&self, file: &FileRecord, staging: &Path) -> Result<TransferEnd> {
        let mut retries = 0u32;

        // Download phase.
        let mut attempt = 1u32;
        loop {
            match self.download_to_staging(file, staging).await {
                Ok(written) => {
                    if written != file.file_size as u64 {
                        return Ok(TransferEnd::Failed {
                            retries,
                            reason: format!(
                                "size mismatch: expected {} bytes, downloaded {}",
                                file.file_size, written
                            ),
                        });
                    }
                    break;
                }
                Err(TransferError::AuthRequired) => {
                    return Ok(TransferEnd::AuthExpired {
                        from: FileStatus::Downloading,
                    })
                }
                Err(TransferError::Fatal { reason }) => {
                    return Ok(TransferEnd::Failed {
                        retries,
                        reason: format!("download failed: {}", reason),
                    })
                }
                Err(TransferError::Transient { reason, cooldown }) => {
                    retries += 1;
                    if !self.config.retry.can_retry(attempt) {
                        return Ok(TransferEnd::Failed {
                            retries,
                            reason: format!(
                                "download failed after {} attempts: {}",
                                attempt, reason
                            ),
                        });
                    }
                    let delay = backoff(&self.config.retry, attempt, cooldown);
                    tracing::warn!(
                        file_id = file.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Download attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }

        self.files
            .transition(file.id, FileStatus::Downloading, FileStatus::Uploading)
            .await
            .context("Failed to mark file uploading")?;

        // Upload phase.
        let mut attempt = 1u32;
        loop {
            match self.upload_from_staging(file, staging).await {
                Ok(()) => break,
                Err(TransferError::AuthRequired) => {
                    return Ok(TransferEnd::AuthExpired {
                        from: FileStatus::Uploading,
                    })
                }
                Err(TransferError::Fatal { reason }) => {
                    return Ok(TransferEnd::Failed {
                        retries,
                        reason: format!("upload failed: {}", reason),
                    })
                }
                Err(TransferError::Transient { reason, cooldown }) => {
                    retries += 1;
                    if !self.config.retry.can_retry(attempt) {
                        return Ok(TransferEnd::Failed {
                            retries,
                            reason: format!("upload failed after {} attempts: {}", attempt, reason),
                        });
                    }
                    let delay = backoff(&self.config.retry, attempt, cooldown);
                    tracing::warn!(
                        file_id = file.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Upload attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }

        self.files
            .transition(file.id, FileStatus::Uploading, FileStatus::Completed)
            .await
            .context("Failed to mark file completed")?;

        Ok(TransferEnd::Completed { retries })
    }

    async fn download_to_staging(
        &self,
        file: &FileRecord,
        staging: &Path,
    ) -> Result<u64, TransferError> {
        let mut stream = self.source.download(file.channel_id, file.message_id).await?;

        let mut out = tokio::fs::File::create(staging)
            .await
            .map_err(io_transient)?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await.map_err(io_transient)?;
            written += chunk.len() as u64;
        }
        out.flush().await.map_err(io_transient)?;
        Ok(written)
    }

    async fn upload_from_staging(
        &self,
        file: &FileRecord,
        staging: &Path,
    ) -> Result<(), TransferError> {
        let staged = tokio::fs::File::open(staging).await.map_err(io_transient)?;
        let size = staged.metadata().await.map_err(io_transient)?.len();
        let reader: Pin<Box<dyn AsyncRead + Send + Unpin>> = Box::pin(staged);
        self.sink
            .put(&file.bucket, &file.object_key, reader, size)
            .await?;
        Ok(())
    }

    fn staging_path(&self, file: &FileRecord) -> PathBuf {
        self.config
            .staging_dir
            .join(format!("{}_{}", file.id, sanitize_filename(&file.file_name)))
    }
}

fn io_transient(e: std::io::Error) -> TransferError {
    TransferError::Transient {
        reason: format!("staging io error: {}", e),
        cooldown: None,
    }
}

/// Delay before the next attempt: policy backoff, or the source-mandated
/// cooldown when it is longer.
fn backoff(policy: &RetryPolicy, attempt: u32, cooldown: Option<Duration>) -> Duration {
    let base = policy.delay_for(attempt);
    match cooldown {
        Some(c) => base.max(c),
        None => base,
    }
}

async fn remove_staging(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staging file");
        }
    }
}
