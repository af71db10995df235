//! Shard configuration
//!
//! Per SHARD_MODEL.md §2: configuration is validated once, at
//! construction, and immutable afterwards. Anything the membership
//! authority owns (the replica set, the epoch) is not configuration.

use super::errors::{ShardError, ShardResult};
use crate::object::ReplicaId;

/// Default per-drive recovery operation budget.
pub const DEFAULT_MAX_RECOVERY_OPS: usize = 8;

/// Static configuration of one shard instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardConfig {
    /// Shard identifier, for logging.
    pub shard_id: u32,
    /// This node's replica identity.
    pub replica: ReplicaId,
    /// Maximum recovery operations started per drive.
    pub max_recovery_ops: usize,
    /// Whether objects may be marked read-balanced at all.
    pub read_balancing: bool,
}

impl ShardConfig {
    /// Creates a configuration with defaults for the tunables.
    pub fn new(shard_id: u32, replica: ReplicaId) -> Self {
        Self {
            shard_id,
            replica,
            max_recovery_ops: DEFAULT_MAX_RECOVERY_OPS,
            read_balancing: true,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ShardResult<()> {
        if self.max_recovery_ops == 0 {
            return Err(ShardError::Config(
                "max_recovery_ops must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ShardConfig::new(0, ReplicaId::new(0)).validate().is_ok());
    }

    #[test]
    fn test_zero_recovery_budget_rejected() {
        let mut cfg = ShardConfig::new(0, ReplicaId::new(0));
        cfg.max_recovery_ops = 0;
        assert!(matches!(cfg.validate(), Err(ShardError::Config(_))));
    }
}
