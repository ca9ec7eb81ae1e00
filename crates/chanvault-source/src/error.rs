use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The source asked us to back off. Carries the cooldown it specified.
    #[error("rate limited by source, cooldown {cooldown:?}")]
    RateLimited { cooldown: Duration },

    /// The cached session is missing, expired, or was revoked. The
    /// pipeline halts scanning and transfers until the operator
    /// re-authenticates; it never marks in-flight files failed for this.
    #[error("source session expired or missing, re-authentication required")]
    AuthRequired,

    #[error("invalid or expired verification code")]
    InvalidCode,

    #[error("channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl SourceError {
    /// Whether the worker may retry within the same claim.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::RateLimited { .. } | SourceError::Transport(_)
        )
    }

    /// Source-mandated cooldown, if any.
    pub fn cooldown(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { cooldown } => Some(*cooldown),
            _ => None,
        }
    }
}
