use chrono::{DateTime, Utc};

/// The single-slot durable credential session.
///
/// The payload is an opaque blob owned by the message-source client; the
/// core persists and returns it without ever parsing it.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CredentialSession {
    pub slot: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
