use serde::{Deserialize, Serialize};

/// A message as reported by the source, carrying at most one attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMessage {
    pub channel_id: i64,
    /// Message position within the channel, strictly increasing.
    pub message_id: i64,
    pub attachment: Option<Attachment>,
}

/// Attachment metadata used for classification. `size` is the
/// source-reported byte count the worker verifies downloads against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub size: i64,
    /// Audio tag metadata, used as a filename fallback.
    pub title: Option<String>,
    pub performer: Option<String>,
}

/// A resolved channel identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: i64,
    pub name: Option<String>,
    pub handle: Option<String>,
}
