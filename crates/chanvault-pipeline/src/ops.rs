//! Operator-facing operations.
//!
//! Everything an outer control surface needs: approvals, retries,
//! on-demand scans, channel management, interactive authentication, and
//! read-only views. All state changes go through the store's conditional
//! transitions, so a stale button press (approving an already-queued
//! file, retrying a file that since completed) comes back as an
//! [`chanvault_core::PipelineError::InvalidTransition`] instead of
//! corrupting the lifecycle.

use anyhow::Result;
use std::sync::Arc;

use chanvault_core::models::{Channel, FileRecord, FileStatus};
use chanvault_core::PipelineError;
use chanvault_db::{ChannelStore, FileStats, FileStore, StatusFilter};
use chanvault_source::MessageSource;

use crate::auth::{AuthFlow, AuthPhase};
use crate::scanner::{ScanOutcome, Scanner};

pub struct Operations {
    files: Arc<dyn FileStore>,
    channels: Arc<dyn ChannelStore>,
    source: Arc<dyn MessageSource>,
    auth: Arc<AuthFlow>,
    scanner: Arc<Scanner>,
}

impl Operations {
    pub fn new(
        files: Arc<dyn FileStore>,
        channels: Arc<dyn ChannelStore>,
        source: Arc<dyn MessageSource>,
        auth: Arc<AuthFlow>,
        scanner: Arc<Scanner>,
    ) -> Self {
        Self {
            files,
            channels,
            source,
            auth,
            scanner,
        }
    }

    /// Approve a single PENDING file for transfer.
    pub async fn approve(&self, file_id: i64) -> Result<FileRecord> {
        let file = self
            .files
            .transition(file_id, FileStatus::Pending, FileStatus::Queued)
            .await?;
        tracing::info!(file_id, "File approved");
        Ok(file)
    }

    /// Approve every PENDING file at once.
    pub async fn approve_all(&self) -> Result<u64> {
        let approved = self.files.approve_all().await?;
        tracing::info!(approved, "Bulk approval");
        Ok(approved)
    }

    /// Re-queue a FAILED file. The file keeps its bucket and object key,
    /// so a successful retry lands exactly where the original would have.
    pub async fn retry(&self, file_id: i64) -> Result<FileRecord> {
        let file = self
            .files
            .transition(file_id, FileStatus::Failed, FileStatus::Queued)
            .await?;
        tracing::info!(file_id, "Failed file re-queued");
        Ok(file)
    }

    /// Scan one channel immediately instead of waiting for the next
    /// scheduled cycle. A deactivated channel is not scannable.
    pub async fn scan_now(&self, channel_id: i64) -> Result<ScanOutcome> {
        if !self.auth.is_ready().await {
            return Err(PipelineError::NotAuthenticated.into());
        }
        let channel = self
            .channels
            .get(channel_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or(PipelineError::ChannelNotFound(channel_id))?;
        self.scanner.scan_channel(&channel).await
    }

    // Authentication

    pub async fn auth_phase(&self) -> AuthPhase {
        self.auth.phase().await
    }

    pub async fn request_login_code(&self) -> Result<()> {
        self.auth.request_code().await
    }

    pub async fn submit_verification_code(&self, code: &str) -> Result<AuthPhase> {
        self.auth.submit_verification_code(code).await
    }

    pub async fn submit_2fa(&self, secret: &str) -> Result<()> {
        self.auth.submit_2fa(secret).await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.auth.invalidate().await
    }

    // Channel management

    /// Register a channel by identifier (numeric id, handle, or invite
    /// link). Resolution goes through the source; re-adding a removed
    /// channel reactivates it with its cursor intact.
    pub async fn add_channel(&self, identifier: &str) -> Result<Channel> {
        let info = self.source.resolve_channel(identifier).await?;
        let channel = self
            .channels
            .upsert(info.id, info.name.as_deref(), info.handle.as_deref())
            .await?;
        tracing::info!(channel_id = channel.id, "Channel registered");
        Ok(channel)
    }

    /// Stop scanning a channel. Already-tracked files are unaffected.
    pub async fn remove_channel(&self, channel_id: i64) -> Result<()> {
        self.channels.deactivate(channel_id).await?;
        tracing::info!(channel_id, "Channel deactivated");
        Ok(())
    }

    pub async fn list_channels(&self, active_only: bool) -> Result<Vec<Channel>> {
        self.channels.list(active_only).await
    }

    // Read-only views

    pub async fn get_file(&self, file_id: i64) -> Result<Option<FileRecord>> {
        self.files.get(file_id).await
    }

    pub async fn list_files(
        &self,
        filter: StatusFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FileRecord>> {
        self.files.list(filter, limit, offset).await
    }

    pub async fn stats(&self) -> Result<FileStats> {
        self.files.stats().await
    }
}
