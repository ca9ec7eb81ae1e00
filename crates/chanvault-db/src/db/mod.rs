//! Postgres repositories.

mod channel;
mod file;
mod session;

pub use channel::ChannelRepository;
pub use file::FileRepository;
pub use session::SessionRepository;
