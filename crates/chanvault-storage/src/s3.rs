use crate::traits::{ObjectSink, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload, Result as ObjectResult};
use std::collections::HashMap;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// S3 sink over a fixed set of destination buckets.
///
/// One `AmazonS3` store is built per bucket at startup; a put against an
/// unknown bucket is a configuration error, never an implicit bucket
/// creation.
pub struct S3Sink {
    stores: HashMap<String, AmazonS3>,
}

impl S3Sink {
    /// Build stores for the given buckets.
    ///
    /// # Arguments
    /// * `buckets` - destination bucket names (audio and document)
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint for S3-compatible providers
    ///   (e.g. "http://localhost:9000" for MinIO)
    pub fn new(
        buckets: &[String],
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut stores = HashMap::new();

        for bucket in buckets {
            let mut builder = AmazonS3Builder::from_env()
                .with_region(region.clone())
                .with_bucket_name(bucket.clone());

            if let Some(ref endpoint) = endpoint_url {
                let allow_http = endpoint.starts_with("http://");
                builder = builder
                    .with_endpoint(endpoint.clone())
                    .with_allow_http(allow_http);
            }

            let store = builder
                .build()
                .map_err(|e| StorageError::ConfigError(e.to_string()))?;
            stores.insert(bucket.clone(), store);
        }

        Ok(S3Sink { stores })
    }

    fn store_for(&self, bucket: &str) -> StorageResult<&AmazonS3> {
        self.stores
            .get(bucket)
            .ok_or_else(|| StorageError::ConfigError(format!("unknown bucket: {}", bucket)))
    }
}

#[async_trait]
impl ObjectSink for S3Sink {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
        size: u64,
    ) -> StorageResult<()> {
        let store = self.store_for(bucket)?;
        let location = Path::from(key.to_string());
        let start = std::time::Instant::now();

        // Buffer the staged bytes and upload in a single put. Staged files
        // are size-verified before upload, so the buffer is bounded by the
        // source-reported attachment size.
        let mut buffer = Vec::with_capacity(size.min(64 * 1024 * 1024) as usize);
        let mut chunk = vec![0u8; 8192];
        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut reader, &mut chunk)
                .await
                .map_err(|e| {
                    StorageError::UploadFailed(format!("Failed to read staged bytes: {}", e))
                })?;
            if bytes_read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..bytes_read]);
        }

        let bytes = Bytes::from(buffer);
        let result: ObjectResult<_> = store.put(&location, PutPayload::from(bytes)).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let store = self.store_for(bucket)?;
        let location = Path::from(key.to_string());
        match store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let store = self.store_for(bucket)?;
        let location = Path::from(key.to_string());

        let result: ObjectResult<_> = store.delete(&location).await;
        match result {
            Ok(_) => Ok(()),
            Err(ObjectStoreError::NotFound { .. }) => Ok(()),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    key = %key,
                    "S3 delete failed"
                );
                Err(StorageError::DeleteFailed(e.to_string()))
            }
        }
    }
}
