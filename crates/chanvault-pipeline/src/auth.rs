//! Interactive authentication flow and session custody.
//!
//! The session blob is read from the credential store once at startup and
//! handed to the source client; afterwards the flow only tracks whether
//! the pipeline may run. When the source reports an expired session the
//! scanner and worker pause and any in-flight file is re-queued rather
//! than failed.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;

use chanvault_core::PipelineError;
use chanvault_db::SessionStore;
use chanvault_source::{AuthOutcome, MessageSource, SourceError};

/// Process-level authentication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    /// Valid session; scanner and worker run.
    Ready,
    /// A login code has been sent and must be submitted.
    AwaitingCode,
    /// The account requires a second factor.
    AwaitingPassword,
    /// No session; interactive authentication has not started.
    SignedOut,
}

pub struct AuthFlow {
    source: Arc<dyn MessageSource>,
    sessions: Arc<dyn SessionStore>,
    slot: String,
    phone: Option<String>,
    phase: RwLock<AuthPhase>,
}

impl AuthFlow {
    pub fn new(
        source: Arc<dyn MessageSource>,
        sessions: Arc<dyn SessionStore>,
        slot: String,
        phone: Option<String>,
    ) -> Self {
        Self {
            source,
            sessions,
            slot,
            phone,
            phase: RwLock::new(AuthPhase::SignedOut),
        }
    }

    /// Startup restore. Returns true when a stored session was accepted.
    pub async fn restore(&self) -> Result<bool> {
        match self.sessions.load(&self.slot).await? {
            Some(session) => match self.source.restore_session(&session.payload).await {
                Ok(()) => {
                    *self.phase.write().await = AuthPhase::Ready;
                    tracing::info!(slot = %self.slot, "Credential session restored");
                    Ok(true)
                }
                Err(SourceError::AuthRequired) => {
                    tracing::warn!(slot = %self.slot, "Stored session rejected, re-authentication required");
                    *self.phase.write().await = AuthPhase::SignedOut;
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            },
            None => {
                tracing::info!(slot = %self.slot, "No stored session, awaiting interactive authentication");
                *self.phase.write().await = AuthPhase::SignedOut;
                Ok(false)
            }
        }
    }

    pub async fn phase(&self) -> AuthPhase {
        *self.phase.read().await
    }

    pub async fn is_ready(&self) -> bool {
        *self.phase.read().await == AuthPhase::Ready
    }

    /// Called by the scanner or worker when the source signals an expired
    /// session mid-operation.
    pub async fn mark_expired(&self) {
        let mut phase = self.phase.write().await;
        if *phase == AuthPhase::Ready {
            tracing::error!("Source session expired, pipeline paused until re-authentication");
            *phase = AuthPhase::SignedOut;
        }
    }

    /// Ask the source to send a login code to the configured phone.
    pub async fn request_code(&self) -> Result<()> {
        let phone = self
            .phone
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no phone number configured for interactive login"))?;
        self.source.request_login_code(phone).await?;
        *self.phase.write().await = AuthPhase::AwaitingCode;
        tracing::info!("Login code requested");
        Ok(())
    }

    /// Submit the verification code. On success the session blob is
    /// persisted before the pipeline is unblocked, so a crash right after
    /// authentication does not lose the session.
    pub async fn submit_verification_code(&self, code: &str) -> Result<AuthPhase> {
        if *self.phase.read().await != AuthPhase::AwaitingCode {
            return Err(PipelineError::NoAuthInProgress.into());
        }

        match self.source.submit_code(code).await? {
            AuthOutcome::Session(payload) => {
                self.sessions.save(&self.slot, &payload).await?;
                *self.phase.write().await = AuthPhase::Ready;
                tracing::info!("Authentication complete");
                Ok(AuthPhase::Ready)
            }
            AuthOutcome::PasswordNeeded => {
                *self.phase.write().await = AuthPhase::AwaitingPassword;
                tracing::info!("Two-factor secret required");
                Ok(AuthPhase::AwaitingPassword)
            }
        }
    }

    /// Submit the two-factor secret and persist the resulting session.
    pub async fn submit_2fa(&self, secret: &str) -> Result<()> {
        if *self.phase.read().await != AuthPhase::AwaitingPassword {
            return Err(PipelineError::NoAuthInProgress.into());
        }

        let payload = self.source.submit_password(secret).await?;
        self.sessions.save(&self.slot, &payload).await?;
        *self.phase.write().await = AuthPhase::Ready;
        tracing::info!("Two-factor authentication complete");
        Ok(())
    }

    /// Operator sign-out: drop the stored blob and pause the pipeline.
    pub async fn invalidate(&self) -> Result<()> {
        self.sessions.invalidate(&self.slot).await?;
        *self.phase.write().await = AuthPhase::SignedOut;
        Ok(())
    }
}
