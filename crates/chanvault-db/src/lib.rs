//! ChanVault DB
//!
//! Postgres data access for the file registry, channel registry, and the
//! single-slot credential store. Repositories are thin structs over a
//! `PgPool`; the pipeline consumes them through the trait seams in
//! [`traits`] so tests can substitute in-memory stores.

pub mod db;
pub mod traits;

pub use db::{ChannelRepository, FileRepository, SessionRepository};
pub use traits::{ChannelStore, FileStats, FileStore, SessionStore, StatusFilter};
