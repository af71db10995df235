//! Object recovery subsystem
//!
//! Per RECOVERY_ENGINE.md, recovery repairs divergence after failures by
//! moving missing objects between replicas: pulls fill the local missing
//! set, pushes fill the peers'. Payloads are planned as byte-range subsets
//! so only what actually changed moves, and every payload is checksummed
//! end to end.
//!
//! # Invariants
//!
//! - One pull per object at a time
//! - Write-blocking objects recover before background backfill
//! - Membership change cancels everything; parked writes surface as errors
//! - A push payload failing verification is discarded without state change

mod engine;
mod errors;

pub use engine::{PullOutcome, RecoveryCursor, RecoveryEngine};
pub use errors::{RecoveryError, RecoveryResult};
