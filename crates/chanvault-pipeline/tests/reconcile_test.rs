#[path = "helpers/mod.rs"]
mod helpers;

use std::time::Duration;

use chanvault_core::models::{FileStatus, MediaKind, NewFile};
use chanvault_db::FileStore;
use chanvault_pipeline::{reset_stale_inflight, Verifier};
use helpers::{setup_app, TestApp, AUDIO_BUCKET};

async fn file_in(app: &TestApp, message_id: i64, status: FileStatus) -> i64 {
    let id = app
        .files
        .insert_discovered(NewFile {
            channel_id: -100,
            message_id,
            file_name: format!("{}.mp3", message_id),
            file_size: 10,
            kind: MediaKind::Audio,
            mime_type: Some("audio/mpeg".to_string()),
            bucket: AUDIO_BUCKET.to_string(),
            object_key: format!("-100/{}/{}.mp3", message_id, message_id),
        })
        .await
        .unwrap()
        .unwrap()
        .id;
    if status != FileStatus::Pending {
        app.files.force_status(id, status);
    }
    id
}

#[tokio::test]
async fn startup_requeues_every_in_flight_file() {
    let app = setup_app().await;
    let downloading = file_in(&app, 1, FileStatus::Downloading).await;
    let uploading = file_in(&app, 2, FileStatus::Uploading).await;
    let pending = file_in(&app, 3, FileStatus::Pending).await;
    let completed = file_in(&app, 4, FileStatus::Completed).await;
    let failed = file_in(&app, 5, FileStatus::Failed).await;

    let reset = reset_stale_inflight(app.files.as_ref()).await.unwrap();
    assert_eq!(reset, 2);

    for id in [downloading, uploading] {
        let file = app.files.get(id).await.unwrap().unwrap();
        assert_eq!(file.status, FileStatus::Queued);
        assert!(file.queued_at.is_some());
    }
    // Everything else is untouched.
    assert_eq!(
        app.files.get(pending).await.unwrap().unwrap().status,
        FileStatus::Pending
    );
    assert_eq!(
        app.files.get(completed).await.unwrap().unwrap().status,
        FileStatus::Completed
    );
    assert_eq!(
        app.files.get(failed).await.unwrap().unwrap().status,
        FileStatus::Failed
    );
}

#[tokio::test]
async fn requeued_stale_files_are_picked_up_by_the_worker() {
    let app = setup_app().await;
    let id = file_in(&app, 1, FileStatus::Downloading).await;
    app.source.set_payload(-100, 1, b"payload ok");

    reset_stale_inflight(app.files.as_ref()).await.unwrap();
    assert!(app.worker.process_next().await.unwrap());
    assert_eq!(
        app.files.get(id).await.unwrap().unwrap().status,
        FileStatus::Completed
    );
}

#[tokio::test]
async fn verifier_reports_missing_objects_without_rewinding() {
    let app = setup_app().await;
    let intact = file_in(&app, 1, FileStatus::Completed).await;
    let missing = file_in(&app, 2, FileStatus::Completed).await;

    // Only the first file's object actually exists.
    app.sink
        .seed_object(AUDIO_BUCKET, "-100/1/1.mp3", b"bytes");

    let verifier = Verifier::new(
        app.files.clone(),
        app.sink.clone(),
        Duration::from_secs(3600),
    );
    let report = verifier.verify_pass().await.unwrap();
    assert_eq!(report.checked, 2);
    assert_eq!(report.missing, 1);

    // Report-only: COMPLETED is terminal.
    for id in [intact, missing] {
        assert_eq!(
            app.files.get(id).await.unwrap().unwrap().status,
            FileStatus::Completed
        );
    }
}

#[tokio::test]
async fn verifier_pass_is_clean_when_all_objects_exist() {
    let app = setup_app().await;
    file_in(&app, 1, FileStatus::Completed).await;
    app.sink.seed_object(AUDIO_BUCKET, "-100/1/1.mp3", b"bytes");

    let verifier = Verifier::new(
        app.files.clone(),
        app.sink.clone(),
        Duration::from_secs(3600),
    );
    let report = verifier.verify_pass().await.unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.missing, 0);
}
