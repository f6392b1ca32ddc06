//! # expiremap - A Concurrent Expiring Key-Value Map
//!
//! expiremap is an in-memory map in which every entry carries its own
//! deadline. Lookups never return an expired value, and storage held by
//! expired entries is reclaimed in the background without the caller's
//! involvement.
//!
//! ## Features
//!
//! - **Per-Entry Timeouts**: every `put` chooses its own lifetime
//! - **Exact Wakeups**: expirer threads sleep until the earliest deadline
//!   instead of polling
//! - **Sharded Deadline Index**: N independent shards, one expirer thread
//!   each, so scheduling never funnels through a single lock
//! - **Safe Overwrites**: generations keep a superseded entry's timer from
//!   ever removing the entry that replaced it
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              ExpireMap                                  │
//! │                                                                         │
//! │      put / get / remove / clear / size                                  │
//! │            │                          │                                 │
//! │            ▼                          ▼                                 │
//! │  ┌──────────────────────┐   ┌──────────────────────────────────────┐   │
//! │  │      Mapping         │   │           DeadlineIndex              │   │
//! │  │  (ShardedMap, or any │   │  ┌────────┐ ┌────────┐ ┌────────┐    │   │
//! │  │   Mapping impl)      │   │  │Shard 0 │ │Shard 1 │ │...N-1  │    │   │
//! │  │  key -> Entry        │   │  │Mutex+  │ │Mutex+  │ │shards  │    │   │
//! │  └──────────▲───────────┘   │  │Condvar │ │Condvar │ │        │    │   │
//! │             │               │  └───┬────┘ └───┬────┘ └───┬────┘    │   │
//! │             │               └──────┼──────────┼──────────┼─────────┘   │
//! │             │                      ▼          ▼          ▼             │
//! │             │                 expirer-0  expirer-1  expirer-N-1        │
//! │             │                      │          │          │             │
//! │             └──────────────────────┴──────────┴──────────┘             │
//! │                     conditional reclamation (remove_if)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use expiremap::{ExpireMap, ExpireMapConfig};
//!
//! let map = ExpireMap::with_config(ExpireMapConfig {
//!     shard_count: 2,
//!     ..Default::default()
//! })
//! .unwrap();
//!
//! map.put("k1".to_string(), "v1".to_string(), 1_000);
//! assert_eq!(map.get(&"k1".to_string()), Some("v1".to_string()));
//!
//! map.remove(&"k1".to_string());
//! assert_eq!(map.get(&"k1".to_string()), None);
//! assert_eq!(map.size(), 0);
//!
//! // Stops and joins the expirer threads (also done on drop)
//! map.shutdown();
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: entry records and the concurrent mapping contract
//! - [`expiry`]: the sharded deadline index and the expirer threads
//! - [`map`]: the `ExpireMap` façade
//! - [`config`] / [`error`]: construction settings and their errors
//!
//! ## Design Highlights
//!
//! ### Stale Expirations
//!
//! Replacing a key does not cancel the old entry's expiration. When it
//! fires, the expirer sees that the key now holds a newer generation and
//! drops it. This keeps `put` to one shard lock.
//!
//! ### Lock Discipline
//!
//! Deadline shard locks are leaf locks. An expirer drains due expirations
//! under its shard lock, releases it, and only then touches the mapping.
//!
//! ### Logging
//!
//! The crate logs through `tracing` and installs no subscriber. Per-key
//! events are at `trace`, batches at `debug`, worker lifecycle at `info`.

pub mod config;
pub mod error;
pub mod expiry;
pub mod map;
pub mod stats;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::ExpireMapConfig;
pub use error::{ConfigError, ConfigResult};
pub use map::ExpireMap;
pub use stats::ExpireMapStats;
pub use storage::{Entry, Generation, Mapping, ShardedMap};

/// Version of expiremap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
