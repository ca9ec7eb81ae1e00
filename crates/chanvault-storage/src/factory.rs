#[cfg(feature = "sink-local")]
use crate::LocalSink;
#[cfg(feature = "sink-s3")]
use crate::S3Sink;
use crate::{ObjectSink, StorageError, StorageResult};
use chanvault_core::config::{Config, StorageBackend};
use std::sync::Arc;

/// Create the object sink selected by configuration.
pub async fn create_sink(config: &Config) -> StorageResult<Arc<dyn ObjectSink>> {
    match config.storage_backend {
        #[cfg(feature = "sink-s3")]
        StorageBackend::S3 => {
            let region = config.s3_region.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let buckets = vec![config.audio_bucket.clone(), config.document_bucket.clone()];
            let sink = S3Sink::new(&buckets, region, config.s3_endpoint.clone())?;
            Ok(Arc::new(sink))
        }

        #[cfg(not(feature = "sink-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 sink not available (sink-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "sink-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let sink = LocalSink::new(base_path).await?;
            Ok(Arc::new(sink))
        }

        #[cfg(not(feature = "sink-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local sink not available (sink-local feature not enabled)".to_string(),
        )),
    }
}
