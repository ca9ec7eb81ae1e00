//! Domain models for the file lifecycle pipeline.

mod channel;
mod file;
mod session;

pub use channel::Channel;
pub use file::{FileRecord, FileStatus, MediaKind, NewFile};
pub use session::CredentialSession;
