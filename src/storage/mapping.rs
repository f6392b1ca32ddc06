//! The key-to-entry mapping consumed by the eviction engine.
//!
//! The engine only needs a handful of per-key linearizable operations from
//! its container, captured by the [`Mapping`] trait. The default container
//! is [`ShardedMap`], a set of independently locked hash maps.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ShardedMap                            │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! These shards are unrelated to the deadline shards in
//! [`crate::expiry`]; they only spread lock contention on the map itself.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of lock shards in a default [`ShardedMap`].
pub const DEFAULT_MAP_SHARDS: usize = 64;

/// A concurrent associative container from keys to entry records.
///
/// Every operation must be linearizable per key. `remove_if` is the
/// primitive the expirer relies on to delete a binding only if it is still
/// the one it scheduled.
pub trait Mapping<K, E>: Send + Sync {
    /// Inserts `entry`, replacing and returning any prior entry.
    fn insert(&self, key: K, entry: E) -> Option<E>;

    /// Returns a clone of the entry for `key`.
    fn get(&self, key: &K) -> Option<E>;

    /// Removes and returns the entry for `key`.
    fn remove(&self, key: &K) -> Option<E>;

    /// Removes the entry for `key` only if `predicate` accepts it.
    ///
    /// Returns `true` if an entry was removed.
    fn remove_if(&self, key: &K, predicate: &dyn Fn(&E) -> bool) -> bool;

    /// Removes every entry.
    fn clear(&self);

    /// Returns the number of entries.
    fn len(&self) -> usize;

    /// Returns true if there are no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// A single lock-protected portion of a [`ShardedMap`].
#[derive(Debug)]
struct Shard<K, E> {
    data: RwLock<HashMap<K, E>>,
}

impl<K, E> Shard<K, E> {
    fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

/// A hash map split across independently locked shards.
///
/// Reads take a shared lock and writes an exclusive lock, both on the one
/// shard the key hashes to. Entries are cloned out on read, so `E` should be
/// cheap to clone (the expiring map stores `Arc`s).
///
/// # Example
///
/// ```
/// use expiremap::storage::{Mapping, ShardedMap};
///
/// let map: ShardedMap<&str, u32> = ShardedMap::new();
/// map.insert("a", 1);
/// assert_eq!(map.get(&"a"), Some(1));
/// assert!(!map.remove_if(&"a", &|v| *v == 2));
/// assert!(map.remove_if(&"a", &|v| *v == 1));
/// assert!(map.is_empty());
/// ```
#[derive(Debug)]
pub struct ShardedMap<K, E> {
    shards: Vec<Shard<K, E>>,
}

impl<K, E> Default for ShardedMap<K, E>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, E> ShardedMap<K, E>
where
    K: Hash + Eq,
{
    /// Creates a map with [`DEFAULT_MAP_SHARDS`] shards.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_MAP_SHARDS)
    }

    /// Creates a map with `count` shards (at least one).
    pub fn with_shards(count: usize) -> Self {
        let shards = (0..count.max(1)).map(|_| Shard::new()).collect();
        Self { shards }
    }

    /// Returns the number of lock shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Gets the shard for a given key.
    #[inline]
    fn get_shard(&self, key: &K) -> &Shard<K, E> {
        &self.shards[self.shard_index(key)]
    }
}

impl<K, E> Mapping<K, E> for ShardedMap<K, E>
where
    K: Hash + Eq + Send + Sync,
    E: Clone + Send + Sync,
{
    fn insert(&self, key: K, entry: E) -> Option<E> {
        let shard = self.get_shard(&key);
        write(&shard.data).insert(key, entry)
    }

    fn get(&self, key: &K) -> Option<E> {
        let shard = self.get_shard(key);
        read(&shard.data).get(key).cloned()
    }

    fn remove(&self, key: &K) -> Option<E> {
        let shard = self.get_shard(key);
        write(&shard.data).remove(key)
    }

    fn remove_if(&self, key: &K, predicate: &dyn Fn(&E) -> bool) -> bool {
        let shard = self.get_shard(key);
        let mut data = write(&shard.data);

        match data.get(key) {
            Some(entry) if predicate(entry) => {
                data.remove(key);
                true
            }
            _ => false,
        }
    }

    fn clear(&self) {
        for shard in &self.shards {
            write(&shard.data).clear();
        }
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|s| read(&s.data).len()).sum()
    }
}

/// A single-lock map, for callers bringing their own stock container.
impl<K, E> Mapping<K, E> for RwLock<HashMap<K, E>>
where
    K: Hash + Eq + Send + Sync,
    E: Clone + Send + Sync,
{
    fn insert(&self, key: K, entry: E) -> Option<E> {
        write(self).insert(key, entry)
    }

    fn get(&self, key: &K) -> Option<E> {
        read(self).get(key).cloned()
    }

    fn remove(&self, key: &K) -> Option<E> {
        write(self).remove(key)
    }

    fn remove_if(&self, key: &K, predicate: &dyn Fn(&E) -> bool) -> bool {
        let mut data = write(self);
        match data.get(key) {
            Some(entry) if predicate(entry) => {
                data.remove(key);
                true
            }
            _ => false,
        }
    }

    fn clear(&self) {
        write(self).clear();
    }

    fn len(&self) -> usize {
        read(self).len()
    }
}
