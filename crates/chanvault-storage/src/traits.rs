//! Storage sink abstraction.

use async_trait::async_trait;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Storage temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether the worker may retry the operation within the same claim.
    /// Rejections (`UploadFailed`, `InvalidKey`, `ConfigError`) are final.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::IoError(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Object-storage sink.
///
/// `put` is idempotent: writing the same bucket/key twice overwrites rather
/// than duplicating. Implementations must not interpret keys beyond path
/// separation; derivation lives in [`crate::keys`].
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Persist `size` bytes from `reader` under `bucket`/`key`.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
        size: u64,
    ) -> StorageResult<()>;

    /// Check whether an object exists.
    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;
}
