//! ChanVault Source
//!
//! Boundary to the external message source. The pipeline only ever talks
//! to the [`MessageSource`] trait; the shipped implementation is an HTTP
//! gateway client (`GatewaySource`). The credential-session payload is an
//! opaque blob owned by the source side and is never parsed here.

pub mod classify;
pub mod error;
pub mod gateway;
pub mod types;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

pub use classify::{classify, Classified};
pub use error::SourceError;
pub use gateway::GatewaySource;
pub use types::{Attachment, ChannelInfo, SourceMessage};

/// Attachment bytes as they arrive from the source.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, SourceError>> + Send>>;

/// Outcome of submitting a verification code or a second-factor secret.
#[derive(Debug)]
pub enum AuthOutcome {
    /// Authentication complete; the blob must be persisted for restarts.
    Session(Vec<u8>),
    /// The account has a second factor; `submit_password` must follow.
    PasswordNeeded,
}

/// External message source client.
///
/// Rate limiting is a first-class signal: implementations must surface it
/// as [`SourceError::RateLimited`] with the source-specified cooldown, and
/// must never translate it into a fatal error.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Resume an authenticated session from a previously saved blob.
    async fn restore_session(&self, payload: &[u8]) -> Result<(), SourceError>;

    /// Ask the source to send a login code to the operator's phone.
    async fn request_login_code(&self, phone: &str) -> Result<(), SourceError>;

    /// Complete interactive authentication with the received code.
    async fn submit_code(&self, code: &str) -> Result<AuthOutcome, SourceError>;

    /// Complete two-factor authentication.
    async fn submit_password(&self, password: &str) -> Result<Vec<u8>, SourceError>;

    /// Resolve a channel identifier (numeric id, handle, or invite link).
    async fn resolve_channel(&self, identifier: &str) -> Result<ChannelInfo, SourceError>;

    /// List messages strictly after `after_position`, ascending, at most
    /// `limit` entries.
    async fn list_messages(
        &self,
        channel_id: i64,
        after_position: i64,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, SourceError>;

    /// Stream the attachment bytes of a message.
    async fn download(&self, channel_id: i64, message_id: i64) -> Result<ByteStream, SourceError>;
}
