//! Recovery error types
//!
//! Per RECOVERY_ENGINE.md §3: recovery failures are per-object and never
//! fatal to the shard. An aborted recovery surfaces to any writes that
//! were parked on it; those clients must re-request.

use crate::object::ObjectId;
use thiserror::Error;

/// Result type for recovery operations
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Recovery errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecoveryError {
    /// A pull for this object is already in flight.
    #[error("pull already in flight for {0}")]
    AlreadyInFlight(ObjectId),

    /// No peer holds a usable copy of the object.
    #[error("no usable source replica for {0}")]
    NoSource(ObjectId),

    /// Recovery was cancelled by a membership change.
    #[error("recovery aborted by membership change")]
    Aborted,
}
