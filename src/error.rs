//! Construction-time errors.
//!
//! Once an [`ExpireMap`](crate::ExpireMap) is built every operation on it is
//! total, so the only failures the crate reports are a bad configuration
//! and the operating system refusing to start an expirer thread.

use thiserror::Error;

/// Errors that can occur while building an expiring map.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `shard_count` was zero
    #[error("shard_count must be at least 1")]
    ZeroShards,

    /// `max_batch` was zero
    #[error("max_batch must be at least 1")]
    ZeroBatch,

    /// An expirer thread could not be spawned
    #[error("failed to spawn expirer thread {shard}: {source}")]
    WorkerSpawn {
        shard: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for building an expiring map.
pub type ConfigResult<T> = Result<T, ConfigError>;
