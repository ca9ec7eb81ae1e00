#[path = "helpers/mod.rs"]
mod helpers;

use std::sync::Arc;

use chanvault_pipeline::test_helpers::{MemorySessionStore, MockSource};
use chanvault_pipeline::{AuthFlow, AuthPhase};
use helpers::{setup_app, SLOT};

fn bare_flow(source: Arc<MockSource>, sessions: Arc<MemorySessionStore>) -> AuthFlow {
    AuthFlow::new(source, sessions, SLOT.to_string(), Some("+15550000000".to_string()))
}

#[tokio::test]
async fn restore_accepts_a_stored_session() {
    let app = setup_app().await;
    // setup_app already restored; the flow is ready.
    assert_eq!(app.auth.phase().await, AuthPhase::Ready);
}

#[tokio::test]
async fn restore_without_a_session_stays_signed_out() {
    let source = Arc::new(MockSource::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let auth = bare_flow(source, sessions);

    assert!(!auth.restore().await.unwrap());
    assert_eq!(auth.phase().await, AuthPhase::SignedOut);
}

#[tokio::test]
async fn rejected_session_requires_reauthentication() {
    let source = Arc::new(MockSource::new());
    source.reject_restore();
    let sessions = Arc::new(MemorySessionStore::with_session(SLOT, b"revoked"));
    let auth = bare_flow(source, sessions);

    assert!(!auth.restore().await.unwrap());
    assert_eq!(auth.phase().await, AuthPhase::SignedOut);
}

#[tokio::test]
async fn code_login_persists_the_session_blob() {
    let source = Arc::new(MockSource::new());
    source.script_login("12345", None);
    let sessions = Arc::new(MemorySessionStore::new());
    let auth = bare_flow(source, sessions.clone());

    auth.request_code().await.unwrap();
    assert_eq!(auth.phase().await, AuthPhase::AwaitingCode);

    let phase = auth.submit_verification_code("12345").await.unwrap();
    assert_eq!(phase, AuthPhase::Ready);
    assert!(auth.is_ready().await);

    // The blob survives a restart.
    assert_eq!(sessions.payload(SLOT).unwrap(), b"mock-session");
}

#[tokio::test]
async fn wrong_code_is_rejected_and_flow_stays_open() {
    let source = Arc::new(MockSource::new());
    source.script_login("12345", None);
    let sessions = Arc::new(MemorySessionStore::new());
    let auth = bare_flow(source, sessions);

    auth.request_code().await.unwrap();
    assert!(auth.submit_verification_code("00000").await.is_err());
    assert_eq!(auth.phase().await, AuthPhase::AwaitingCode);

    // The right code still works afterwards.
    assert_eq!(
        auth.submit_verification_code("12345").await.unwrap(),
        AuthPhase::Ready
    );
}

#[tokio::test]
async fn two_factor_accounts_need_the_secret() {
    let source = Arc::new(MockSource::new());
    source.script_login("12345", Some("hunter2"));
    let sessions = Arc::new(MemorySessionStore::new());
    let auth = bare_flow(source, sessions.clone());

    auth.request_code().await.unwrap();
    let phase = auth.submit_verification_code("12345").await.unwrap();
    assert_eq!(phase, AuthPhase::AwaitingPassword);
    // No session yet.
    assert!(sessions.payload(SLOT).is_none());

    auth.submit_2fa("hunter2").await.unwrap();
    assert!(auth.is_ready().await);
    assert!(sessions.payload(SLOT).is_some());
}

#[tokio::test]
async fn code_submission_out_of_order_is_rejected() {
    let source = Arc::new(MockSource::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let auth = bare_flow(source, sessions);

    assert!(auth.submit_verification_code("12345").await.is_err());
    assert!(auth.submit_2fa("hunter2").await.is_err());
}

#[tokio::test]
async fn sign_out_drops_the_session_and_pauses() {
    let app = setup_app().await;
    assert!(app.auth.is_ready().await);

    app.ops.sign_out().await.unwrap();
    assert_eq!(app.auth.phase().await, AuthPhase::SignedOut);
    assert!(app.sessions.payload(SLOT).is_none());

    // A paused pipeline scans nothing.
    assert_eq!(app.scanner.scan_cycle().await.unwrap(), 0);
}
