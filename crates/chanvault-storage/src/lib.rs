//! ChanVault Storage
//!
//! Object-storage sink abstraction and implementations. The worker streams
//! staged bytes into a sink under a deterministic key; writes to the same
//! key overwrite, which is safe because keys are derived from immutable
//! file identity.
//!
//! # Key format
//!
//! `{channel_id}/{message_id}/{sanitized file name}` inside a
//! bucket chosen by media kind (one bucket for audio, one for documents).
//! Key generation is centralized in the `keys` module.

pub mod factory;
pub mod keys;
#[cfg(feature = "sink-local")]
pub mod local;
#[cfg(feature = "sink-s3")]
pub mod s3;
pub mod traits;

pub use factory::create_sink;
pub use keys::{object_key, sanitize_filename};
#[cfg(feature = "sink-local")]
pub use local::LocalSink;
#[cfg(feature = "sink-s3")]
pub use s3::S3Sink;
pub use traits::{ObjectSink, StorageError, StorageResult};
