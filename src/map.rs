//! The Expiring Map
//!
//! [`ExpireMap`] ties the mapping, the deadline index, and the expirer
//! threads together behind a small API: `put`, `get`, `remove`, `clear`,
//! and `size`.
//!
//! ## Write Path
//!
//! ```text
//!   put(k, v, ttl)
//!     │
//!     ├─ 1. entry = { v, now + ttl, fresh generation }
//!     ├─ 2. mapping.insert(k, entry)          (replaces any prior entry)
//!     └─ 3. index.schedule(deadline, generation, k)
//! ```
//!
//! The entry is visible before its expiration is scheduled, so a worker
//! never fires for a generation it cannot find yet. The replaced entry's
//! expiration is left in place; it turns stale and the worker discards it.
//!
//! ## Read Path
//!
//! `get` reads the mapping only. An entry past its deadline is reported as
//! absent even if no worker has reclaimed it yet.

use crate::config::ExpireMapConfig;
use crate::error::ConfigResult;
use crate::expiry::{DeadlineIndex, ExpirerPool, Expiration};
use crate::stats::{ExpireMapStats, StatsCounter};
use crate::storage::{Entry, Mapping, ShardedMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// A concurrent map whose entries are removed once their deadline passes.
///
/// Every entry carries its own timeout. Lookups never return an expired
/// value, and expired entries are reclaimed in the background by one
/// expirer thread per deadline shard.
///
/// # Thread Safety
///
/// All operations take `&self`; wrap the map in an `Arc` to share it. Client
/// calls only ever block on one short, per-shard critical section.
///
/// # Example
///
/// ```
/// use expiremap::ExpireMap;
/// use std::time::Duration;
///
/// let map = ExpireMap::new();
///
/// map.put("session", "token123", 60_000);
/// assert_eq!(map.get(&"session"), Some("token123"));
///
/// map.put_with_ttl("flash", "gone soon", Duration::ZERO);
/// assert_eq!(map.get(&"flash"), None);
///
/// assert!(map.remove(&"session"));
/// assert_eq!(map.get(&"session"), None);
/// ```
pub struct ExpireMap<K, V, M = ShardedMap<K, Arc<Entry<V>>>> {
    /// Key -> entry, shared with the expirers
    mapping: Arc<M>,

    /// Pending expirations, sharded by key
    index: DeadlineIndex<K>,

    /// One expirer thread per index shard
    workers: Mutex<ExpirerPool>,

    /// Counters shared with the expirers
    stats: Arc<StatsCounter>,

    config: ExpireMapConfig,

    _value: PhantomData<fn() -> V>,
}

impl<K, V, M> Debug for ExpireMap<K, V, M>
where
    M: Mapping<K, Arc<Entry<V>>>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpireMap")
            .field("shards", &self.index.shard_count())
            .field("max_batch", &self.config.max_batch)
            .field("entries", &self.mapping.len())
            .field("pending", &self.index.pending())
            .finish()
    }
}

impl<K, V> ExpireMap<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates a map with the default configuration and mapping.
    ///
    /// # Panics
    ///
    /// Panics if the operating system cannot create the expirer threads,
    /// like [`std::thread::spawn`]. Use [`with_config`](Self::with_config)
    /// to handle that case.
    pub fn new() -> Self {
        match Self::with_config(ExpireMapConfig::default()) {
            Ok(map) => map,
            Err(e) => panic!("failed to start expiring map: {e}"),
        }
    }

    /// Creates a map with the given configuration and the default mapping.
    pub fn with_config(config: ExpireMapConfig) -> ConfigResult<Self> {
        Self::with_mapping(ShardedMap::new(), config)
    }
}

impl<K, V> Default for ExpireMap<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, M> ExpireMap<K, V, M>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
    M: Mapping<K, Arc<Entry<V>>> + 'static,
{
    /// Creates a map over a caller-supplied container.
    ///
    /// The container should be empty: entries already in it have no
    /// scheduled expiration and are never reclaimed in the background.
    pub fn with_mapping(mapping: M, config: ExpireMapConfig) -> ConfigResult<Self> {
        config.validate()?;

        let mapping = Arc::new(mapping);
        let index = DeadlineIndex::new(config.shard_count);
        let stats = Arc::new(StatsCounter::new());
        let workers = ExpirerPool::start::<K, V, M>(
            &index,
            Arc::clone(&mapping),
            Arc::clone(&stats),
            &config,
        )?;

        info!(
            shards = config.shard_count,
            max_batch = config.max_batch,
            "Expiring map started"
        );

        Ok(Self {
            mapping,
            index,
            workers: Mutex::new(workers),
            stats,
            config,
            _value: PhantomData,
        })
    }

    /// Stores `value` under `key` for `timeout_ms` milliseconds.
    ///
    /// Replaces any prior binding for `key`. A timeout of zero makes the
    /// entry immediately eligible for expiry.
    pub fn put(&self, key: K, value: V, timeout_ms: u64) {
        self.put_with_ttl(key, value, Duration::from_millis(timeout_ms));
    }

    /// Stores `value` under `key` until `ttl` has elapsed.
    ///
    /// # Panics
    ///
    /// Panics if the deadline cannot be represented by the monotonic clock.
    pub fn put_with_ttl(&self, key: K, value: V, ttl: Duration) {
        self.stats.record_put();

        let entry = Arc::new(Entry::new(value, Instant::now(), ttl));
        let expiration = Expiration {
            deadline: entry.deadline,
            generation: entry.generation,
            key: key.clone(),
        };

        trace!(key = ?key, generation = %entry.generation, ttl_ms = ttl.as_millis() as u64, "Put");
        self.mapping.insert(key, entry);
        self.index.schedule(expiration);
    }

    /// Returns the value for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        let value = self.live_entry(key).map(|entry| entry.value.clone());
        self.stats.record_get(value.is_some());
        value
    }

    /// Returns the live entry for `key` with its metadata.
    pub fn get_entry(&self, key: &K) -> Option<Arc<Entry<V>>> {
        self.live_entry(key)
    }

    fn live_entry(&self, key: &K) -> Option<Arc<Entry<V>>> {
        self.mapping
            .get(key)
            .filter(|entry| !entry.is_expired_at(Instant::now()))
    }

    /// Checks if a live binding exists for `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.live_entry(key).is_some()
    }

    /// Returns the time left before `key` expires, or `None` if it is
    /// absent or already expired.
    pub fn ttl(&self, key: &K) -> Option<Duration> {
        let now = Instant::now();
        self.mapping
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.remaining_at(now))
    }

    /// Removes the binding for `key` and cancels its expiration.
    ///
    /// Idempotent. Returns `true` if a binding was present, including an
    /// expired one the expirers had not reclaimed yet.
    pub fn remove(&self, key: &K) -> bool {
        match self.mapping.remove(key) {
            Some(entry) => {
                self.stats.record_remove();
                let cancelled = self.index.cancel(key, entry.generation);
                trace!(key = ?key, generation = %entry.generation, cancelled, "Removed");
                true
            }
            None => false,
        }
    }

    /// Removes every binding and every pending expiration.
    ///
    /// The index is emptied before the mapping: a `put` racing with
    /// `clear` can at worst leave an expiration without an entry, which
    /// the expirer discards, never an entry without an expiration.
    pub fn clear(&self) {
        self.index.clear();
        self.mapping.clear();
        debug!("Expiring map cleared");
    }

    /// Returns the number of bindings, including expired ones not yet
    /// reclaimed.
    pub fn size(&self) -> usize {
        self.mapping.len()
    }

    /// Same as [`size`](Self::size).
    pub fn len(&self) -> usize {
        self.size()
    }

    /// Returns true if the mapping holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Returns the number of expirations held by the index, live and stale.
    pub fn pending(&self) -> usize {
        self.index.pending()
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> ExpireMapStats {
        self.stats.snapshot(self.mapping.len(), self.index.pending())
    }
}

impl<K, V, M> ExpireMap<K, V, M> {
    /// Returns the configuration the map was built with.
    pub fn config(&self) -> &ExpireMapConfig {
        &self.config
    }

    /// Stops and joins every expirer thread. Idempotent.
    ///
    /// The map keeps answering `get`, `put`, and `remove` correctly
    /// afterwards, but expired entries are no longer reclaimed in the
    /// background. Also runs on drop.
    pub fn shutdown(&self) {
        self.index.shutdown();

        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if !workers.is_empty() {
            workers.join();
            info!("Expiring map shut down");
        }
    }
}

impl<K, V, M> Drop for ExpireMap<K, V, M> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::collections::HashMap;
    use std::sync::RwLock;
    use std::thread;

    fn map() -> ExpireMap<String, String> {
        ExpireMap::new()
    }

    #[test]
    fn test_put_and_get() {
        let map = map();
        map.put("key1".to_string(), "value1".to_string(), 10_000);
        assert_eq!(map.get(&"key1".to_string()), Some("value1".to_string()));
        assert_eq!(map.size(), 1);
        assert_eq!(map.pending(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let map = map();
        assert_eq!(map.get(&"nonexistent".to_string()), None);
    }

    #[test]
    fn test_remove_cancels_expiration() {
        let map = map();
        map.put("key1".to_string(), "value1".to_string(), 10_000);

        assert!(map.remove(&"key1".to_string()));
        assert_eq!(map.get(&"key1".to_string()), None);
        assert_eq!(map.pending(), 0);

        // Second remove is a no-op
        assert!(!map.remove(&"key1".to_string()));
    }

    #[test]
    fn test_overwrite_leaves_stale_expiration() {
        let map = map();
        map.put("k".to_string(), "v1".to_string(), 10_000);
        map.put("k".to_string(), "v2".to_string(), 20_000);

        assert_eq!(map.get(&"k".to_string()), Some("v2".to_string()));
        assert_eq!(map.size(), 1);
        // The first expiration is not cancelled by the overwrite
        assert_eq!(map.pending(), 2);

        // Removing cancels only the live one
        assert!(map.remove(&"k".to_string()));
        assert_eq!(map.pending(), 1);
    }

    #[test]
    fn test_expired_entry_is_hidden_before_reclamation() {
        let map: ExpireMap<String, String> = ExpireMap::new();
        map.shutdown();

        map.put("k".to_string(), "v".to_string(), 0);
        assert_eq!(map.get(&"k".to_string()), None);
        assert!(!map.contains_key(&"k".to_string()));
        assert_eq!(map.ttl(&"k".to_string()), None);
        // No expirer running: still counted
        assert_eq!(map.size(), 1);
    }

    #[test]
    fn test_ttl() {
        let map = map();
        map.put("k".to_string(), "v".to_string(), 60_000);

        let ttl = map.ttl(&"k".to_string()).unwrap();
        assert!(ttl <= Duration::from_secs(60));
        assert!(ttl > Duration::from_secs(59));
        assert_eq!(map.ttl(&"missing".to_string()), None);
    }

    #[test]
    fn test_get_entry_exposes_metadata() {
        let map = map();
        map.put("k".to_string(), "v1".to_string(), 60_000);
        let first = map.get_entry(&"k".to_string()).unwrap();
        map.put("k".to_string(), "v2".to_string(), 60_000);
        let second = map.get_entry(&"k".to_string()).unwrap();

        assert_eq!(second.value, "v2");
        assert!(second.generation > first.generation);
    }

    #[test]
    fn test_expiry_reclaims() {
        let map = map();
        map.put("k".to_string(), "v".to_string(), 50);
        assert_eq!(map.size(), 1);

        thread::sleep(Duration::from_millis(300));
        assert_eq!(map.get(&"k".to_string()), None);
        assert_eq!(map.size(), 0);
        assert_eq!(map.pending(), 0);
        assert_eq!(map.stats().expired, 1);
    }

    #[test]
    fn test_clear() {
        let map = map();
        for i in 0..20 {
            map.put(format!("key{}", i), "value".to_string(), 10_000);
        }
        assert_eq!(map.size(), 20);

        map.clear();
        assert_eq!(map.size(), 0);
        assert!(map.is_empty());
        assert_eq!(map.pending(), 0);
    }

    #[test]
    fn test_stats() {
        let map = map();
        map.put("a".to_string(), "1".to_string(), 10_000);
        map.get(&"a".to_string());
        map.get(&"b".to_string());
        map.remove(&"a".to_string());

        let stats = map.stats();
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.removes, 1);
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_invalid_config() {
        let result: ConfigResult<ExpireMap<String, String>> =
            ExpireMap::with_config(ExpireMapConfig::with_shards(0));
        assert!(matches!(result, Err(ConfigError::ZeroShards)));
    }

    #[test]
    fn test_custom_mapping() {
        let mapping: RwLock<HashMap<u32, Arc<Entry<u32>>>> = RwLock::new(HashMap::new());
        let map: ExpireMap<u32, u32, _> =
            ExpireMap::with_mapping(mapping, ExpireMapConfig::with_shards(1)).unwrap();

        map.put(1, 10, 10_000);
        map.put(2, 20, 30);
        assert_eq!(map.get(&1), Some(10));

        thread::sleep(Duration::from_millis(250));
        assert_eq!(map.get(&2), None);
        assert_eq!(map.size(), 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let map = map();
        map.shutdown();
        map.shutdown();

        map.put("k".to_string(), "v".to_string(), 10_000);
        assert_eq!(map.get(&"k".to_string()), Some("v".to_string()));
    }

    #[test]
    fn test_concurrent_access() {
        let map = Arc::new(map());
        let mut handles = vec![];

        for i in 0..10 {
            let map = Arc::clone(&map);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    map.put(key.clone(), "value".to_string(), 60_000);
                    assert_eq!(map.get(&key), Some("value".to_string()));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(map.size(), 1000);
        assert_eq!(map.pending(), 1000);
    }
}
