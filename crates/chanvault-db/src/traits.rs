//! Store trait seams.
//!
//! The scanner, worker, and operator operations only depend on these
//! traits, which keeps them testable without a database. The Postgres
//! repositories in [`crate::db`] are the production implementations; the
//! pipeline crate ships in-memory ones for tests.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use chanvault_core::models::{Channel, CredentialSession, FileRecord, FileStatus, NewFile};

/// File listing filter. `Active` matches the original dashboard's pseudo
/// status covering QUEUED, DOWNLOADING, and UPLOADING.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Status(FileStatus),
    Active,
    All,
}

/// Per-status counts for the dashboard collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FileStats {
    pub pending: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

/// File registry access.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Register a discovered file as PENDING. Idempotent on
    /// `(channel_id, message_id)`: a duplicate discovery returns `None`.
    async fn insert_discovered(&self, file: NewFile) -> Result<Option<FileRecord>>;

    async fn get(&self, id: i64) -> Result<Option<FileRecord>>;

    async fn list(&self, filter: StatusFilter, limit: i64, offset: i64)
        -> Result<Vec<FileRecord>>;

    /// Atomic conditional transition. Fails with
    /// [`chanvault_core::PipelineError::InvalidTransition`] when the row is
    /// not in `from` at update time, which is the single-lane claim
    /// guarantee and the approval/retry race guard.
    async fn transition(&self, id: i64, from: FileStatus, to: FileStatus) -> Result<FileRecord>;

    /// Bulk PENDING -> QUEUED. Returns the number of files approved.
    async fn approve_all(&self) -> Result<u64>;

    /// Claim the oldest QUEUED file (FIFO by `queued_at`, ties by id) and
    /// move it to DOWNLOADING in one atomic step. Returns `None` when the
    /// queue is empty or another file is already in flight; at most one
    /// file is ever in flight across all processes.
    async fn claim_next(&self) -> Result<Option<FileRecord>>;

    /// Terminal failure with the reason recorded; only legal from an
    /// in-flight status.
    async fn mark_failed(&self, id: i64, reason: &str) -> Result<FileRecord>;

    /// Add the worker's in-claim transfer attempts to the running count.
    async fn record_attempts(&self, id: i64, attempts: i32) -> Result<()>;

    /// Startup reconciliation: every in-flight row is stale after a
    /// restart and goes back to QUEUED. Returns how many were reset.
    async fn reset_stale_inflight(&self) -> Result<u64>;

    async fn stats(&self) -> Result<FileStats>;
}

/// Channel registry access.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn list(&self, active_only: bool) -> Result<Vec<Channel>>;

    async fn get(&self, id: i64) -> Result<Option<Channel>>;

    /// Insert or reactivate a channel.
    async fn upsert(&self, id: i64, name: Option<&str>, handle: Option<&str>) -> Result<Channel>;

    /// Soft delete.
    async fn deactivate(&self, id: i64) -> Result<()>;

    /// Advance the scan cursor. The stored cursor never moves backwards.
    async fn advance_cursor(&self, id: i64, position: i64) -> Result<()>;
}

/// Single-slot durable credential store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, slot: &str) -> Result<Option<CredentialSession>>;

    /// Upsert, last-write-wins.
    async fn save(&self, slot: &str, payload: &[u8]) -> Result<()>;

    async fn invalidate(&self, slot: &str) -> Result<()>;
}
