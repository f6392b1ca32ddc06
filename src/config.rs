//! Configuration for an [`ExpireMap`](crate::ExpireMap).

use crate::error::{ConfigError, ConfigResult};

/// Default number of deadline shards (and expirer threads).
pub const DEFAULT_SHARD_COUNT: usize = 4;

/// Default upper bound on expirations reclaimed per worker cycle.
pub const DEFAULT_MAX_BATCH: usize = 256;

/// Default prefix for expirer thread names.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "expirer";

/// Configuration for the eviction engine.
///
/// # Example
///
/// ```
/// use expiremap::ExpireMapConfig;
///
/// let config = ExpireMapConfig {
///     shard_count: 8,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpireMapConfig {
    /// Number of deadline shards, one expirer thread each (default: 4).
    ///
    /// More shards reduce contention under high write rates; each one
    /// costs a thread.
    pub shard_count: usize,

    /// Maximum expirations a worker drains per cycle (default: 256).
    ///
    /// Bounds how long `put`/`remove` can wait on a shard while a burst
    /// of deadlines fires.
    pub max_batch: usize,

    /// Prefix for expirer thread names; the shard index is appended.
    pub thread_name_prefix: String,
}

impl Default for ExpireMapConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            max_batch: DEFAULT_MAX_BATCH,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl ExpireMapConfig {
    /// Creates a default configuration with the given shard count.
    pub fn with_shards(shard_count: usize) -> Self {
        Self {
            shard_count,
            ..Default::default()
        }
    }

    /// Checks that every setting is in range.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.shard_count == 0 {
            return Err(ConfigError::ZeroShards);
        }
        if self.max_batch == 0 {
            return Err(ConfigError::ZeroBatch);
        }
        Ok(())
    }

    /// Name of the expirer thread serving `shard`.
    pub(crate) fn thread_name(&self, shard: usize) -> String {
        format!("{}-{}", self.thread_name_prefix, shard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExpireMapConfig::default();
        assert_eq!(config.shard_count, 4);
        assert_eq!(config.max_batch, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_shards() {
        let config = ExpireMapConfig::with_shards(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroShards)));
    }

    #[test]
    fn test_rejects_zero_batch() {
        let config = ExpireMapConfig {
            max_batch: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroBatch)));
    }

    #[test]
    fn test_thread_name() {
        let config = ExpireMapConfig {
            thread_name_prefix: "reaper".to_string(),
            ..Default::default()
        };
        assert_eq!(config.thread_name(2), "reaper-2");
    }
}
