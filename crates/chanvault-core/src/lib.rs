//! ChanVault Core
//!
//! Domain models, configuration, error types, and the transfer retry policy
//! shared by every other crate in the workspace. This crate is free of I/O;
//! the database and storage crates depend on it, never the other way around.

pub mod config;
pub mod error;
pub mod models;
pub mod retry;

pub use config::Config;
pub use error::PipelineError;
pub use retry::RetryPolicy;
