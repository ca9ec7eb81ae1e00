//! Attachment classification.
//!
//! Decides whether a message's attachment is worth tracking and, if so,
//! which media kind it is and what display name to record. Unsupported
//! attachments are ignored; the scanner still advances its cursor past
//! them so they are never re-inspected.

use crate::types::SourceMessage;
use chanvault_core::models::MediaKind;

const AUDIO_MIME_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mp3",
    "audio/ogg",
    "audio/wav",
    "audio/flac",
    "audio/aac",
    "audio/m4a",
    "audio/x-m4a",
];

const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/epub+zip",
];

/// Classification result: the detected kind and the display name to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: MediaKind,
    pub file_name: String,
}

/// Classify a message's attachment. Returns `None` for messages with no
/// attachment or an unsupported type.
pub fn classify(message: &SourceMessage) -> Option<Classified> {
    let attachment = message.attachment.as_ref()?;
    let mime = attachment.mime_type.as_deref().unwrap_or("");

    let kind = if AUDIO_MIME_TYPES.contains(&mime) || mime.starts_with("audio/") {
        MediaKind::Audio
    } else if DOCUMENT_MIME_TYPES.contains(&mime) {
        MediaKind::Document
    } else {
        return None;
    };

    let file_name = attachment
        .file_name
        .clone()
        .or_else(|| {
            // Audio tag fallback: "{performer} - {title}".
            attachment.title.as_ref().map(|title| {
                let performer = attachment.performer.as_deref().unwrap_or("Unknown");
                format!("{} - {}", performer, title)
            })
        })
        .unwrap_or_else(|| {
            let ext = match kind {
                MediaKind::Audio => ".mp3",
                MediaKind::Document => ".pdf",
            };
            format!("file_{}{}", message.message_id, ext)
        });

    Some(Classified { kind, file_name })
}
