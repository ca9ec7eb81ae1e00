use crate::traits::{ObjectSink, StorageError, StorageResult};
use async_trait::async_trait;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::fs;
use tokio::io::AsyncRead;

/// Local filesystem sink. Objects land at `{base}/{bucket}/{key}`.
///
/// Intended for development and tests; the production deployment uses
/// [`crate::S3Sink`].
#[derive(Clone)]
pub struct LocalSink {
    base_path: PathBuf,
}

impl LocalSink {
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create sink directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalSink { base_path })
    }

    /// Validate the key stays under the base directory.
    fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') || bucket.contains(['/', '.']) {
            return Err(StorageError::InvalidKey(format!("{}/{}", bucket, key)));
        }
        Ok(self.base_path.join(bucket).join(key))
    }
}

#[async_trait]
impl ObjectSink for LocalSink {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        mut reader: Pin<Box<dyn AsyncRead + Send + Unpin>>,
        size: u64,
    ) -> StorageResult<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        tokio::io::AsyncWriteExt::flush(&mut file).await?;

        if written != size {
            // Do not leave a short object behind.
            let _ = fs::remove_file(&path).await;
            return Err(StorageError::UploadFailed(format!(
                "wrote {} bytes, expected {}",
                written, size
            )));
        }

        tracing::debug!(bucket = %bucket, key = %key, size_bytes = size, "local sink write");
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let path = self.object_path(bucket, key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_exists_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalSink::new(dir.path()).await.unwrap();

        let data = b"hello sink".to_vec();
        let reader: Pin<Box<dyn AsyncRead + Send + Unpin>> =
            Box::pin(std::io::Cursor::new(data.clone()));
        sink.put("audio-archive", "1/2/a.mp3", reader, data.len() as u64)
            .await
            .unwrap();

        assert!(sink.exists("audio-archive", "1/2/a.mp3").await.unwrap());
        sink.delete("audio-archive", "1/2/a.mp3").await.unwrap();
        assert!(!sink.exists("audio-archive", "1/2/a.mp3").await.unwrap());
    }

    #[tokio::test]
    async fn same_key_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalSink::new(dir.path()).await.unwrap();

        for payload in [b"first".to_vec(), b"other".to_vec()] {
            let reader: Pin<Box<dyn AsyncRead + Send + Unpin>> =
                Box::pin(std::io::Cursor::new(payload.clone()));
            sink.put("b", "1/1/f.pdf", reader, payload.len() as u64)
                .await
                .unwrap();
        }

        let content = std::fs::read(dir.path().join("b/1/1/f.pdf")).unwrap();
        assert_eq!(content, b"other");
    }

    #[tokio::test]
    async fn size_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalSink::new(dir.path()).await.unwrap();

        let reader: Pin<Box<dyn AsyncRead + Send + Unpin>> =
            Box::pin(std::io::Cursor::new(b"short".to_vec()));
        let err = sink.put("b", "1/1/f.pdf", reader, 100).await.unwrap_err();
        assert!(matches!(err, StorageError::UploadFailed(_)));
        assert!(!sink.exists("b", "1/1/f.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LocalSink::new(dir.path()).await.unwrap();
        let err = sink.exists("b", "../escape").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
