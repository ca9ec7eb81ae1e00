use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Media kind detected at discovery time. Determines the destination bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Document,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Document => write!(f, "document"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(MediaKind::Audio),
            "document" => Ok(MediaKind::Document),
            _ => Err(anyhow::anyhow!("Invalid media kind: {}", s)),
        }
    }
}

/// Lifecycle status of a discovered file.
///
/// Statuses are stored as the `file_status` Postgres enum with uppercase
/// labels. The only legal transitions are the edges checked by
/// [`FileStatus::can_transition`]; the repositories enforce them with
/// conditional updates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "file_status", rename_all = "UPPERCASE")
)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileStatus {
    Pending,
    Queued,
    Downloading,
    Uploading,
    Completed,
    Failed,
}

impl FileStatus {
    /// Whether moving from `self` to `next` follows a legal edge of the
    /// state machine. The FAILED → QUEUED edge is the operator retry path;
    /// DOWNLOADING/UPLOADING → QUEUED is the startup reconciliation path
    /// for in-flight rows orphaned by an unclean shutdown.
    pub fn can_transition(self, next: FileStatus) -> bool {
        use FileStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Queued, Downloading)
                | (Downloading, Uploading)
                | (Uploading, Completed)
                | (Downloading, Failed)
                | (Uploading, Failed)
                | (Failed, Queued)
                | (Downloading, Queued)
                | (Uploading, Queued)
        )
    }

    /// True while the worker holds a claim on the file.
    pub fn is_in_flight(self) -> bool {
        matches!(self, FileStatus::Downloading | FileStatus::Uploading)
    }

    /// True when no further automatic processing will happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Failed)
    }
}

impl Display for FileStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileStatus::Pending => write!(f, "PENDING"),
            FileStatus::Queued => write!(f, "QUEUED"),
            FileStatus::Downloading => write!(f, "DOWNLOADING"),
            FileStatus::Uploading => write!(f, "UPLOADING"),
            FileStatus::Completed => write!(f, "COMPLETED"),
            FileStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for FileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(FileStatus::Pending),
            "QUEUED" => Ok(FileStatus::Queued),
            "DOWNLOADING" => Ok(FileStatus::Downloading),
            "UPLOADING" => Ok(FileStatus::Uploading),
            "COMPLETED" => Ok(FileStatus::Completed),
            "FAILED" => Ok(FileStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid file status: {}", s)),
        }
    }
}

/// A discovered attachment tracked through the lifecycle pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FileRecord {
    pub id: i64,
    pub channel_id: i64,
    /// Message position within the channel; `(channel_id, message_id)` is
    /// the stable external identity of the file.
    pub message_id: i64,
    pub file_name: String,
    pub file_size: i64,
    pub kind: MediaKind,
    pub mime_type: Option<String>,
    pub status: FileStatus,
    /// Destination, derived once at discovery and immutable thereafter.
    pub bucket: String,
    pub object_key: String,
    /// Transfer attempts made by the worker across all claims.
    pub retry_count: i32,
    pub error_message: Option<String>,
    /// Set when the file enters QUEUED; the worker consumes oldest first.
    pub queued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to register a newly discovered file.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub channel_id: i64,
    pub message_id: i64,
    pub file_name: String,
    pub file_size: i64,
    pub kind: MediaKind,
    pub mime_type: Option<String>,
    pub bucket: String,
    pub object_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_edges_are_legal() {
        use FileStatus::*;
        assert!(Pending.can_transition(Queued));
        assert!(Queued.can_transition(Downloading));
        assert!(Downloading.can_transition(Uploading));
        assert!(Uploading.can_transition(Completed));
    }

    #[test]
    fn failure_edges_only_from_active_states() {
        use FileStatus::*;
        assert!(Downloading.can_transition(Failed));
        assert!(Uploading.can_transition(Failed));
        assert!(!Pending.can_transition(Failed));
        assert!(!Queued.can_transition(Failed));
        assert!(!Completed.can_transition(Failed));
    }

    #[test]
    fn no_state_skipping() {
        use FileStatus::*;
        assert!(!Pending.can_transition(Downloading));
        assert!(!Pending.can_transition(Completed));
        assert!(!Queued.can_transition(Uploading));
        assert!(!Queued.can_transition(Completed));
        assert!(!Downloading.can_transition(Completed));
    }

    #[test]
    fn retry_and_reconcile_are_the_only_backward_edges() {
        use FileStatus::*;
        assert!(Failed.can_transition(Queued));
        assert!(Downloading.can_transition(Queued));
        assert!(Uploading.can_transition(Queued));
        assert!(!Completed.can_transition(Queued));
        assert!(!Queued.can_transition(Pending));
        assert!(!Completed.can_transition(Pending));
    }

    #[test]
    fn status_round_trips_through_display() {
        use FileStatus::*;
        for status in [Pending, Queued, Downloading, Uploading, Completed, Failed] {
            assert_eq!(status.to_string().parse::<FileStatus>().unwrap(), status);
        }
    }
}
