use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored external channel.
///
/// `last_scanned_message_id` is the scan cursor: the highest message
/// position whose classification has been durably recorded. Only the
/// scanner advances it, and only after a whole page of discoveries has
/// been registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Channel {
    /// Stable external channel identifier.
    pub id: i64,
    pub name: Option<String>,
    pub handle: Option<String>,
    pub last_scanned_message_id: i64,
    /// Scanning is skipped while false; removal is a soft delete.
    pub is_active: bool,
    pub added_at: DateTime<Utc>,
}
