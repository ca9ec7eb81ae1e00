//! Configuration module
//!
//! All settings are read from environment variables with sensible defaults;
//! the binary calls `dotenvy` before `Config::from_env()` so a `.env` file
//! works in development.

use std::env;
use std::time::Duration;

use crate::retry::RetryPolicy;

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SCAN_INTERVAL_SECS: u64 = 60;
const DEFAULT_SCAN_PAGE_SIZE: usize = 500;
const DEFAULT_WORKER_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_VERIFY_INTERVAL_SECS: u64 = 3600;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,

    // Storage
    pub storage_backend: StorageBackend,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (e.g. MinIO).
    pub s3_endpoint: Option<String>,
    pub audio_bucket: String,
    pub document_bucket: String,
    pub local_storage_path: Option<String>,

    // Message source gateway
    pub gateway_url: String,
    pub gateway_token: Option<String>,
    /// Phone number the login code is sent to during interactive auth.
    pub source_phone: Option<String>,
    /// Name of the single credential-session row.
    pub session_slot: String,

    // Pipeline
    pub staging_dir: String,
    pub scan_interval: Duration,
    pub scan_page_size: usize,
    pub worker_poll_interval: Duration,
    pub retry: RetryPolicy,
    /// Interval for the completed-object verification pass. 0 = disabled.
    pub verify_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let storage_backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "s3".to_string())
            .to_lowercase()
            .as_str()
        {
            "local" => StorageBackend::Local,
            _ => StorageBackend::S3,
        };

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_DB_TIMEOUT_SECS),

            storage_backend,
            s3_region: env::var("S3_REGION").or_else(|_| env::var("AWS_REGION")).ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            audio_bucket: env::var("AUDIO_BUCKET").unwrap_or_else(|_| "audio-archive".to_string()),
            document_bucket: env::var("DOCUMENT_BUCKET")
                .unwrap_or_else(|_| "document-archive".to_string()),
            local_storage_path: env::var("LOCAL_STORAGE_PATH").ok(),

            gateway_url: env::var("SOURCE_GATEWAY_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
            gateway_token: env::var("SOURCE_GATEWAY_TOKEN").ok(),
            source_phone: env::var("SOURCE_PHONE").ok(),
            session_slot: env::var("SESSION_SLOT").unwrap_or_else(|_| "chanvault".to_string()),

            staging_dir: env::var("STAGING_DIR")
                .unwrap_or_else(|_| "/tmp/chanvault-staging".to_string()),
            scan_interval: Duration::from_secs(
                env::var("SCAN_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_SCAN_INTERVAL_SECS),
            ),
            scan_page_size: env::var("SCAN_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_SCAN_PAGE_SIZE),
            worker_poll_interval: Duration::from_millis(
                env::var("WORKER_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_WORKER_POLL_INTERVAL_MS),
            ),
            retry: RetryPolicy {
                max_attempts: env::var("TRANSFER_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
                base_delay: Duration::from_millis(
                    env::var("TRANSFER_BASE_DELAY_MS")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(1000),
                ),
                max_delay: Duration::from_millis(
                    env::var("TRANSFER_MAX_DELAY_MS")
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(60_000),
                ),
            },
            verify_interval: Duration::from_secs(
                env::var("VERIFY_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_VERIFY_INTERVAL_SECS),
            ),
        })
    }

    /// Destination bucket for a media kind. A pure function of the kind;
    /// there are exactly two destinations.
    pub fn bucket_for(&self, kind: crate::models::MediaKind) -> &str {
        match kind {
            crate::models::MediaKind::Audio => &self.audio_bucket,
            crate::models::MediaKind::Document => &self.document_bucket,
        }
    }
}
