//! ChanVault Pipeline
//!
//! The file lifecycle pipeline: the periodic channel scanner, the
//! single-lane transfer worker, the approval gate and the other operator
//! operations, the interactive auth flow, and startup/periodic
//! reconciliation. The scanner and worker are independent scheduled tasks
//! that communicate only through the durable file registry; the atomic
//! claim in the registry is the sole synchronization between them.

pub mod auth;
pub mod ops;
pub mod reconcile;
pub mod scanner;
pub mod test_helpers;
pub mod worker;

pub use auth::{AuthFlow, AuthPhase};
pub use ops::Operations;
pub use reconcile::{reset_stale_inflight, Verifier, VerifyReport};
pub use scanner::{ScanOutcome, Scanner, ScannerConfig};
pub use worker::{Worker, WorkerConfig};
