#[path = "helpers/mod.rs"]
mod helpers;

use std::sync::Arc;
use std::time::Duration;

use chanvault_core::models::{FileStatus, MediaKind};
use chanvault_db::{ChannelStore, FileStore, StatusFilter};
use chanvault_pipeline::test_helpers::{
    MemoryChannelStore, MemoryFileStore, MemorySessionStore,
};
use chanvault_pipeline::{AuthFlow, Scanner, ScannerConfig};
use chanvault_source::{
    AuthOutcome, ByteStream, ChannelInfo, MessageSource, SourceError, SourceMessage,
};
use helpers::{
    audio_message, document_message, setup_app, setup_app_with_page_size, unrelated_message,
    AUDIO_BUCKET, DOCUMENT_BUCKET,
};

#[tokio::test]
async fn scan_registers_supported_attachments_only() {
    let app = setup_app().await;
    app.channels.upsert(-100, Some("Archive"), None).await.unwrap();

    app.source.add_message(audio_message(-100, 1, "track.mp3", 1024));
    app.source.add_message(unrelated_message(-100, 2));
    app.source.add_message(audio_message(-100, 3, "other.mp3", 2048));

    let registered = app.scanner.scan_cycle().await.unwrap();
    assert_eq!(registered, 2);

    // The cursor still moved past the unsupported message.
    assert_eq!(app.channels.cursor(-100), Some(3));

    let files = app
        .files
        .list(StatusFilter::Status(FileStatus::Pending), 100, 0)
        .await
        .unwrap();
    assert_eq!(files.len(), 2);
    for file in &files {
        assert_eq!(file.status, FileStatus::Pending);
        assert_eq!(file.kind, MediaKind::Audio);
        assert_eq!(file.bucket, AUDIO_BUCKET);
        assert_eq!(
            file.object_key,
            format!("-100/{}/{}", file.message_id, file.file_name)
        );
    }
}

#[tokio::test]
async fn documents_land_in_the_document_bucket() {
    let app = setup_app().await;
    app.channels.upsert(-7, None, None).await.unwrap();
    app.source.add_message(document_message(-7, 5, "paper.pdf", 512));

    app.scanner.scan_cycle().await.unwrap();

    let files = app.files.list(StatusFilter::All, 10, 0).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].kind, MediaKind::Document);
    assert_eq!(files[0].bucket, DOCUMENT_BUCKET);
}

#[tokio::test]
async fn rescan_is_idempotent() {
    let app = setup_app().await;
    app.channels.upsert(-100, None, None).await.unwrap();
    app.source.add_message(audio_message(-100, 1, "a.mp3", 10));
    app.source.add_message(audio_message(-100, 2, "b.mp3", 20));

    assert_eq!(app.scanner.scan_cycle().await.unwrap(), 2);
    assert_eq!(app.scanner.scan_cycle().await.unwrap(), 0);

    let files = app.files.list(StatusFilter::All, 100, 0).await.unwrap();
    assert_eq!(files.len(), 2);
}

#[tokio::test]
async fn scan_resumes_from_cursor_without_reinspecting() {
    let app = setup_app().await;
    app.channels.upsert(-100, None, None).await.unwrap();
    app.source.add_message(audio_message(-100, 1, "a.mp3", 10));
    app.scanner.scan_cycle().await.unwrap();

    let after_first = app.source.list_calls();
    app.source.add_message(audio_message(-100, 2, "b.mp3", 20));
    assert_eq!(app.scanner.scan_cycle().await.unwrap(), 1);

    // The second cycle listed from position 1, so it only saw message 2.
    assert!(app.source.list_calls() > after_first);
    assert_eq!(app.channels.cursor(-100), Some(2));
}

#[tokio::test]
async fn scan_cut_off_by_transport_error_holds_the_cursor() {
    let app = setup_app().await;
    app.channels.upsert(-100, None, None).await.unwrap();
    app.source.add_message(audio_message(-100, 1, "a.mp3", 10));

    app.source
        .fail_next_list(SourceError::Transport("connection reset".to_string()));
    let channel = app.channels.get(-100).await.unwrap().unwrap();
    assert!(app.scanner.scan_channel(&channel).await.is_err());
    assert_eq!(app.channels.cursor(-100), Some(0));

    // The next cycle picks up from where the cursor actually is.
    assert_eq!(app.scanner.scan_cycle().await.unwrap(), 1);
    assert_eq!(app.channels.cursor(-100), Some(1));
}

#[tokio::test]
async fn crash_between_registration_and_cursor_commit_converges() {
    // Crash state: page one's discoveries are durable but the cursor never
    // moved. The next cycle re-inspects the page and the unique
    // (channel, message) identity absorbs the duplicates.
    let app = setup_app_with_page_size(2).await;
    app.channels.upsert(-100, None, None).await.unwrap();
    for id in 1..=4 {
        app.source
            .add_message(audio_message(-100, id, &format!("{}.mp3", id), 10));
    }

    for id in 1..=2 {
        let msg = audio_message(-100, id, &format!("{}.mp3", id), 10);
        let att = msg.attachment.as_ref().unwrap();
        app.files
            .insert_discovered(chanvault_core::models::NewFile {
                channel_id: -100,
                message_id: id,
                file_name: format!("{}.mp3", id),
                file_size: att.size,
                kind: MediaKind::Audio,
                mime_type: att.mime_type.clone(),
                bucket: AUDIO_BUCKET.to_string(),
                object_key: format!("-100/{}/{}.mp3", id, id),
            })
            .await
            .unwrap();
    }
    assert_eq!(app.channels.cursor(-100), Some(0));

    let registered = app.scanner.scan_cycle().await.unwrap();
    assert_eq!(registered, 2);
    assert_eq!(app.channels.cursor(-100), Some(4));
    assert_eq!(
        app.files.list(StatusFilter::All, 100, 0).await.unwrap().len(),
        4
    );
}

#[tokio::test]
async fn rate_limited_channel_is_cooled_down_not_failed() {
    let app = setup_app().await;
    app.channels.upsert(-1, None, None).await.unwrap();
    app.source.add_message(audio_message(-1, 1, "a.mp3", 10));

    app.source.fail_next_list(SourceError::RateLimited {
        cooldown: Duration::from_secs(3600),
    });

    // Cycle survives the rate limit and registers nothing.
    assert_eq!(app.scanner.scan_cycle().await.unwrap(), 0);

    // The channel stays in cooldown, so the next cycle skips it without
    // touching the source again.
    let calls = app.source.list_calls();
    assert_eq!(app.scanner.scan_cycle().await.unwrap(), 0);
    assert_eq!(app.source.list_calls(), calls);
}

#[tokio::test]
async fn inactive_channels_are_not_scanned() {
    let app = setup_app().await;
    app.channels.upsert(-1, None, None).await.unwrap();
    app.source.add_message(audio_message(-1, 1, "a.mp3", 10));
    app.channels.deactivate(-1).await.unwrap();

    assert_eq!(app.scanner.scan_cycle().await.unwrap(), 0);
    assert_eq!(app.source.list_calls(), 0);
}

#[tokio::test]
async fn expired_session_stops_the_cycle() {
    let app = setup_app().await;
    app.channels.upsert(-1, None, None).await.unwrap();
    app.source.fail_next_list(SourceError::AuthRequired);

    assert_eq!(app.scanner.scan_cycle().await.unwrap(), 0);
    assert!(!app.auth.is_ready().await);

    // Subsequent cycles no-op until re-authentication.
    assert_eq!(app.scanner.scan_cycle().await.unwrap(), 0);
}

/// A misbehaving source that ignores the cursor and replays the same full
/// page on every call.
struct StuckSource;

#[async_trait::async_trait]
impl MessageSource for StuckSource {
    async fn restore_session(&self, _payload: &[u8]) -> Result<(), SourceError> {
        Ok(())
    }

    async fn request_login_code(&self, _phone: &str) -> Result<(), SourceError> {
        Ok(())
    }

    async fn submit_code(&self, _code: &str) -> Result<AuthOutcome, SourceError> {
        Err(SourceError::InvalidCode)
    }

    async fn submit_password(&self, _password: &str) -> Result<Vec<u8>, SourceError> {
        Err(SourceError::InvalidCode)
    }

    async fn resolve_channel(&self, identifier: &str) -> Result<ChannelInfo, SourceError> {
        Err(SourceError::ChannelUnavailable(identifier.to_string()))
    }

    async fn list_messages(
        &self,
        channel_id: i64,
        _after_position: i64,
        _limit: usize,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        Ok(vec![
            audio_message(channel_id, 1, "a.mp3", 10),
            audio_message(channel_id, 2, "b.mp3", 10),
        ])
    }

    async fn download(&self, channel_id: i64, message_id: i64) -> Result<ByteStream, SourceError> {
        Err(SourceError::NotFound(format!("{}/{}", channel_id, message_id)))
    }
}

#[tokio::test]
async fn page_that_does_not_advance_the_cursor_stops_the_scan() {
    let files = Arc::new(MemoryFileStore::new());
    let channels = Arc::new(MemoryChannelStore::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let source = Arc::new(StuckSource);
    let auth = Arc::new(AuthFlow::new(
        source.clone(),
        sessions,
        "test".to_string(),
        None,
    ));
    let scanner = Scanner::new(
        files.clone(),
        channels.clone(),
        source,
        auth,
        ScannerConfig {
            interval: Duration::from_secs(60),
            page_size: 2,
            audio_bucket: AUDIO_BUCKET.to_string(),
            document_bucket: DOCUMENT_BUCKET.to_string(),
        },
    );
    let channel = channels.upsert(-100, None, None).await.unwrap();

    // The first full page registers and commits normally; the replay of
    // the same page must end the scan instead of paging forever.
    let outcome = scanner.scan_channel(&channel).await.unwrap();
    assert_eq!(outcome.newly_registered, 2);
    assert_eq!(outcome.cursor, 2);
    assert_eq!(channels.cursor(-100), Some(2));
}
