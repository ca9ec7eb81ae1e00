use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use chanvault_core::retry::RetryPolicy;
use chanvault_pipeline::test_helpers::{
    MemoryChannelStore, MemoryFileStore, MemorySessionStore, MemorySink, MockSource,
};
use chanvault_pipeline::{
    AuthFlow, Operations, Scanner, ScannerConfig, Worker, WorkerConfig,
};
use chanvault_source::{Attachment, SourceMessage};

pub const AUDIO_BUCKET: &str = "audio-archive";
pub const DOCUMENT_BUCKET: &str = "document-archive";
pub const SLOT: &str = "test";

pub struct TestApp {
    pub files: Arc<MemoryFileStore>,
    pub channels: Arc<MemoryChannelStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub sink: Arc<MemorySink>,
    pub source: Arc<MockSource>,
    pub auth: Arc<AuthFlow>,
    pub scanner: Arc<Scanner>,
    pub worker: Arc<Worker>,
    pub ops: Operations,
    // Keeps the staging directory alive for the test's duration.
    pub staging: TempDir,
}

pub async fn setup_app() -> TestApp {
    setup_app_with_page_size(500).await
}

pub async fn setup_app_with_page_size(page_size: usize) -> TestApp {
    let files = Arc::new(MemoryFileStore::new());
    let channels = Arc::new(MemoryChannelStore::new());
    let sessions = Arc::new(MemorySessionStore::with_session(SLOT, b"stored-session"));
    let sink = Arc::new(MemorySink::new());
    let source = Arc::new(MockSource::new());
    let staging = TempDir::new().unwrap();

    let auth = Arc::new(AuthFlow::new(
        source.clone(),
        sessions.clone(),
        SLOT.to_string(),
        Some("+15550000000".to_string()),
    ));
    assert!(auth.restore().await.unwrap());

    let scanner = Arc::new(Scanner::new(
        files.clone(),
        channels.clone(),
        source.clone(),
        auth.clone(),
        ScannerConfig {
            interval: Duration::from_secs(60),
            page_size,
            audio_bucket: AUDIO_BUCKET.to_string(),
            document_bucket: DOCUMENT_BUCKET.to_string(),
        },
    ));

    let worker = Arc::new(Worker::new(
        files.clone(),
        sink.clone(),
        source.clone(),
        auth.clone(),
        WorkerConfig {
            poll_interval: Duration::from_millis(10),
            staging_dir: staging.path().to_path_buf(),
            // Tiny delays so retry paths run fast.
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        },
    ));

    let ops = Operations::new(
        files.clone(),
        channels.clone(),
        source.clone(),
        auth.clone(),
        scanner.clone(),
    );

    TestApp {
        files,
        channels,
        sessions,
        sink,
        source,
        auth,
        scanner,
        worker,
        ops,
        staging,
    }
}

pub fn audio_message(channel_id: i64, message_id: i64, name: &str, size: i64) -> SourceMessage {
    SourceMessage {
        channel_id,
        message_id,
        attachment: Some(Attachment {
            file_name: Some(name.to_string()),
            mime_type: Some("audio/mpeg".to_string()),
            size,
            title: None,
            performer: None,
        }),
    }
}

pub fn document_message(channel_id: i64, message_id: i64, name: &str, size: i64) -> SourceMessage {
    SourceMessage {
        channel_id,
        message_id,
        attachment: Some(Attachment {
            file_name: Some(name.to_string()),
            mime_type: Some("application/pdf".to_string()),
            size,
            title: None,
            performer: None,
        }),
    }
}

pub fn unrelated_message(channel_id: i64, message_id: i64) -> SourceMessage {
    SourceMessage {
        channel_id,
        message_id,
        attachment: Some(Attachment {
            file_name: Some("photo.jpg".to_string()),
            mime_type: Some("image/jpeg".to_string()),
            size: 99,
            title: None,
            performer: None,
        }),
    }
}
