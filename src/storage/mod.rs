//! Storage Module
//!
//! The mapping half of the expiring map: entry records and the concurrent
//! container that holds them.
//!
//! The eviction engine treats the container as a collaborator reached
//! through the [`Mapping`] trait. [`ShardedMap`] is the default; a plain
//! `RwLock<HashMap>` works too.
//!
//! ## Example
//!
//! ```
//! use expiremap::storage::{Entry, Mapping, ShardedMap};
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! let map: ShardedMap<&str, Arc<Entry<&str>>> = ShardedMap::new();
//! let entry = Arc::new(Entry::new("token123", Instant::now(), Duration::from_secs(60)));
//! map.insert("session", entry);
//!
//! let found = map.get(&"session").unwrap();
//! assert_eq!(found.value, "token123");
//! assert!(!found.is_expired());
//! ```

pub mod entry;
pub mod mapping;

// Re-export commonly used types
pub use entry::{Entry, Generation};
pub use mapping::{Mapping, ShardedMap, DEFAULT_MAP_SHARDS};
