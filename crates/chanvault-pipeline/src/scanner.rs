//! Discovery scanner.
//!
//! Walks every active channel forward from its stored cursor, classifies
//! attachments, and registers supported ones as PENDING. The cursor for a
//! channel only advances after a full page of discoveries has been
//! recorded, so a crash mid-page re-inspects the page on the next cycle
//! and the unique `(channel_id, message_id)` constraint absorbs the
//! duplicates.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use chanvault_core::models::{Channel, NewFile};
use chanvault_db::{ChannelStore, FileStore};
use chanvault_source::{classify, MessageSource, SourceError};
use chanvault_storage::keys::object_key;

use crate::auth::AuthFlow;

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub interval: Duration,
    pub page_size: usize,
    pub audio_bucket: String,
    pub document_bucket: String,
}

/// Result of scanning one channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOutcome {
    /// Files registered as PENDING this pass (duplicates excluded).
    pub newly_registered: u64,
    /// Cursor position after the pass.
    pub cursor: i64,
}

pub struct Scanner {
    files: Arc<dyn FileStore>,
    channels: Arc<dyn ChannelStore>,
    source: Arc<dyn MessageSource>,
    auth: Arc<AuthFlow>,
    config: ScannerConfig,
    /// Per-channel rate-limit cooldowns. A channel in cooldown is skipped,
    /// not failed; the scanner comes back to it on a later cycle.
    cooldowns: Mutex<HashMap<i64, Instant>>,
}

impl Scanner {
    pub fn new(
        files: Arc<dyn FileStore>,
        channels: Arc<dyn ChannelStore>,
        source: Arc<dyn MessageSource>,
        auth: Arc<AuthFlow>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            files,
            channels,
            source,
            auth,
            config,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Periodic scan loop. Runs until a shutdown signal arrives.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            page_size = self.config.page_size,
            "Scanner started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_cycle().await {
                        tracing::error!(error = %e, "Scan cycle failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Scanner shutting down");
                    break;
                }
            }
        }
    }

    /// One pass over every active channel. Also the entry point for the
    /// operator's on-demand scan.
    pub async fn scan_cycle(&self) -> Result<u64> {
        if !self.auth.is_ready().await {
            tracing::debug!("Skipping scan cycle, source not authenticated");
            return Ok(0);
        }

        let channels = self.channels.list(true).await?;
        let mut total = 0u64;

        for channel in &channels {
            if self.in_cooldown(channel.id).await {
                tracing::debug!(channel_id = channel.id, "Channel in rate-limit cooldown, skipping");
                continue;
            }

            match self.scan_channel(channel).await {
                Ok(outcome) => {
                    total += outcome.newly_registered;
                    if outcome.newly_registered > 0 {
                        tracing::info!(
                            channel_id = channel.id,
                            registered = outcome.newly_registered,
                            cursor = outcome.cursor,
                            "Channel scan registered new files"
                        );
                    }
                }
                Err(e) => match e.downcast_ref::<SourceError>() {
                    Some(SourceError::RateLimited { cooldown }) => {
                        tracing::warn!(
                            channel_id = channel.id,
                            cooldown_secs = cooldown.as_secs(),
                            "Rate limited while scanning, cooling channel down"
                        );
                        self.set_cooldown(channel.id, *cooldown).await;
                    }
                    Some(SourceError::AuthRequired) => {
                        self.auth.mark_expired().await;
                        return Ok(total);
                    }
                    _ => {
                        tracing::error!(channel_id = channel.id, error = %e, "Channel scan failed");
                    }
                },
            }
        }

        Ok(total)
    }

    /// Scan one channel forward from its cursor, page by page.
    pub async fn scan_channel(&self, channel: &Channel) -> Result<ScanOutcome> {
        let mut cursor = channel.last_scanned_message_id;
        let mut registered = 0u64;

        loop {
            let page = self
                .source
                .list_messages(channel.id, cursor, self.config.page_size)
                .await?;
            if page.is_empty() {
                break;
            }

            // A page that does not move past the cursor would page forever.
            let highest_in_page = page.iter().map(|m| m.message_id).max().unwrap_or(cursor);
            if highest_in_page <= cursor {
                tracing::warn!(
                    channel_id = channel.id,
                    cursor,
                    "Source returned a page that does not advance the cursor, stopping"
                );
                break;
            }

            let mut page_high = cursor;
            for message in &page {
                page_high = page_high.max(message.message_id);

                let Some(classified) = classify(message) else {
                    continue;
                };
                // classify() only returns Some for messages with an attachment
                let Some(attachment) = message.attachment.as_ref() else {
                    continue;
                };

                let bucket = match classified.kind {
                    chanvault_core::models::MediaKind::Audio => self.config.audio_bucket.clone(),
                    chanvault_core::models::MediaKind::Document => {
                        self.config.document_bucket.clone()
                    }
                };
                let key = object_key(channel.id, message.message_id, &classified.file_name);

                let inserted = self
                    .files
                    .insert_discovered(NewFile {
                        channel_id: channel.id,
                        message_id: message.message_id,
                        file_name: classified.file_name.clone(),
                        file_size: attachment.size,
                        kind: classified.kind,
                        mime_type: attachment.mime_type.clone(),
                        bucket,
                        object_key: key,
                    })
                    .await
                    .context("Failed to register discovered file")?;

                if let Some(file) = inserted {
                    tracing::debug!(
                        file_id = file.id,
                        channel_id = channel.id,
                        message_id = message.message_id,
                        kind = %file.kind,
                        "Registered discovered file"
                    );
                    registered += 1;
                }
            }

            // Commit the cursor only once the whole page is registered.
            let short_page = page.len() < self.config.page_size;
            self.channels
                .advance_cursor(channel.id, page_high)
                .await
                .context("Failed to advance scan cursor")?;
            cursor = page_high;

            if short_page {
                break;
            }
        }

        Ok(ScanOutcome {
            newly_registered: registered,
            cursor,
        })
    }

    async fn in_cooldown(&self, channel_id: i64) -> bool {
        let mut cooldowns = self.cooldowns.lock().await;
        match cooldowns.get(&channel_id) {
            Some(until) if *until > Instant::now() => true,
            Some(_) => {
                cooldowns.remove(&channel_id);
                false
            }
            None => false,
        }
    }

    async fn set_cooldown(&self, channel_id: i64, cooldown: Duration) {
        self.cooldowns
            .lock()
            .await
            .insert(channel_id, Instant::now() + cooldown);
    }
}
