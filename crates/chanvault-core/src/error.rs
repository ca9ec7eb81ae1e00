//! Error types shared across the pipeline crates.
//!
//! Boundary crates (storage, source) define their own error enums; this
//! module holds the domain-level failures raised by repositories and
//! operator operations.

use crate::models::FileStatus;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A conditional status update found the row in a different state than
    /// expected. Surfaced to the operator unchanged so racing approvals or
    /// double retries are visible rather than silently absorbed.
    #[error("invalid status transition for file {file_id}: {from} -> {to}")]
    InvalidTransition {
        file_id: i64,
        from: FileStatus,
        to: FileStatus,
    },

    #[error("file {0} not found")]
    FileNotFound(i64),

    #[error("channel {0} not found")]
    ChannelNotFound(i64),

    #[error("not authenticated with the message source")]
    NotAuthenticated,

    #[error("no authentication flow in progress")]
    NoAuthInProgress,
}
