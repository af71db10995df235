//! Shard-level error type
//!
//! The shard surface unifies the per-subsystem errors; callers match on
//! the variant when they care which path failed.

use crate::recovery::RecoveryError;
use crate::write::WriteError;
use thiserror::Error;

/// Result type for shard operations
pub type ShardResult<T> = Result<T, ShardError>;

/// Errors surfaced by the shard API
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShardError {
    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
