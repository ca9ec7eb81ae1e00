//! Startup reconciliation and completed-object verification.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use chanvault_core::models::FileStatus;
use chanvault_db::{FileStore, StatusFilter};
use chanvault_storage::ObjectSink;

/// Startup reconciliation: after a restart every DOWNLOADING or UPLOADING
/// row is an orphan of the previous process, so all of them go back to
/// QUEUED. Runs before the worker starts, which is what makes the check
/// safe without coordination.
pub async fn reset_stale_inflight(files: &dyn FileStore) -> Result<u64> {
    let reset = files.reset_stale_inflight().await?;
    if reset > 0 {
        tracing::warn!(reset, "Re-queued stale in-flight files from previous run");
    }
    Ok(reset)
}

/// Outcome of one verification pass over COMPLETED files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub checked: u64,
    pub missing: u64,
}

/// Periodic audit that every COMPLETED file still has its object in
/// storage. Report-only: COMPLETED is terminal, so a missing object is
/// logged for the operator rather than rewound in the registry.
pub struct Verifier {
    files: Arc<dyn FileStore>,
    sink: Arc<dyn ObjectSink>,
    interval: Duration,
}

const VERIFY_PAGE: i64 = 200;

impl Verifier {
    pub fn new(files: Arc<dyn FileStore>, sink: Arc<dyn ObjectSink>, interval: Duration) -> Self {
        Self {
            files,
            sink,
            interval,
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: mpsc::Receiver<()>) {
        if self.interval.is_zero() {
            tracing::info!("Object verification disabled");
            return;
        }
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Object verifier started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.verify_pass().await {
                        Ok(report) if report.missing > 0 => {
                            tracing::error!(
                                checked = report.checked,
                                missing = report.missing,
                                "Verification found completed files with missing objects"
                            );
                        }
                        Ok(report) => {
                            tracing::debug!(checked = report.checked, "Verification pass clean");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Verification pass failed");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Object verifier shutting down");
                    break;
                }
            }
        }
    }

    /// Check every COMPLETED file's object. Pages through the registry so
    /// a large archive does not load at once.
    pub async fn verify_pass(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();
        let mut offset = 0i64;

        loop {
            let page = self
                .files
                .list(
                    StatusFilter::Status(FileStatus::Completed),
                    VERIFY_PAGE,
                    offset,
                )
                .await?;
            if page.is_empty() {
                break;
            }

            for file in &page {
                report.checked += 1;
                if !self.sink.exists(&file.bucket, &file.object_key).await? {
                    report.missing += 1;
                    tracing::warn!(
                        file_id = file.id,
                        bucket = %file.bucket,
                        object_key = %file.object_key,
                        "Completed file has no object in storage"
                    );
                }
            }

            offset += page.len() as i64;
        }

        Ok(report)
    }
}
