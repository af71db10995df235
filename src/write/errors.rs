//! Write-path error types
//!
//! Per WRITE_PROTOCOL.md §5:
//! - A stale version is the client's race to lose: rejected, retry with a
//!   fresh version
//! - Storage apply failure is fatal to the single write, never retried
//!   inside this core
//! - Failures local to one write never abort unrelated in-flight writes

use crate::object::TxnId;
use crate::version::Version;
use thiserror::Error;

/// Result type for write-path operations
pub type WriteResult<T> = Result<T, WriteError>;

/// Write-path errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WriteError {
    /// The write raced against a newer accepted version.
    #[error("stale version: write expected {expected}, object is at {latest}")]
    StaleVersion { expected: Version, latest: Version },

    /// The storage engine could not apply the local transaction.
    #[error("storage apply failed for {tid}: {reason}")]
    StorageApplyFailure { tid: TxnId, reason: String },

    /// The write's snapshot context is internally inconsistent.
    #[error("invalid snapshot context")]
    InvalidSnapContext,
}
