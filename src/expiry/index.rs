//! The sharded deadline index.
//!
//! Expirations are spread over `N` independent [`DeadlineShard`]s by
//! hashing the key, so every expiration for a given key lands in the same
//! shard and cancelling by key touches exactly one shard lock.

use crate::expiry::shard::{DeadlineShard, Expiration};
use crate::storage::Generation;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

/// `N` deadline shards addressed by key.
#[derive(Debug)]
pub struct DeadlineIndex<K> {
    shards: Vec<Arc<DeadlineShard<K>>>,
}

impl<K> DeadlineIndex<K> {
    /// Creates an index with `shard_count` empty shards (at least one).
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|i| Arc::new(DeadlineShard::new(i)))
            .collect();
        Self { shards }
    }

    /// Returns the number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns every shard, in index order.
    pub fn shards(&self) -> &[Arc<DeadlineShard<K>>] {
        &self.shards
    }

    /// Empties every shard, one at a time.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.clear();
        }
        debug!(shards = self.shards.len(), "Deadline index cleared");
    }

    /// Total pending expirations, live and stale.
    pub fn pending(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    /// Signals every shard's worker to exit.
    pub fn shutdown(&self) {
        for shard in &self.shards {
            shard.shutdown();
        }
    }
}

impl<K> DeadlineIndex<K>
where
    K: Hash + PartialEq + std::fmt::Debug,
{
    /// Determines which shard a key belongs to.
    ///
    /// Uses a fixed-key hasher so the mapping is stable for the lifetime
    /// of the process.
    #[inline]
    pub fn shard_of(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Gets the shard for a given key.
    #[inline]
    pub fn shard_for(&self, key: &K) -> &Arc<DeadlineShard<K>> {
        &self.shards[self.shard_of(key)]
    }

    /// Schedules an expiration in its key's shard.
    pub fn schedule(&self, expiration: Expiration<K>) {
        self.shard_for(&expiration.key).schedule(expiration);
    }

    /// Cancels the expiration `generation` of `key`.
    pub fn cancel(&self, key: &K, generation: Generation) -> bool {
        self.shard_for(key).cancel(key, generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_same_key_same_shard() {
        let index: DeadlineIndex<String> = DeadlineIndex::new(8);
        for i in 0..100 {
            let key = format!("key-{}", i);
            let shard = index.shard_of(&key);
            assert!(shard < 8);
            assert_eq!(index.shard_of(&key.clone()), shard);
        }
    }

    #[test]
    fn test_keys_spread_over_shards() {
        let index: DeadlineIndex<String> = DeadlineIndex::new(4);
        let mut used = [false; 4];
        for i in 0..200 {
            used[index.shard_of(&format!("key-{}", i))] = true;
        }
        assert!(used.iter().all(|&u| u));
    }

    #[test]
    fn test_schedule_cancel_routes_by_key() {
        let index = DeadlineIndex::new(4);
        let deadline = Instant::now() + Duration::from_secs(60);
        let generation = Generation::next();

        index.schedule(Expiration {
            deadline,
            generation,
            key: "k1".to_string(),
        });
        assert_eq!(index.pending(), 1);
        assert_eq!(index.shard_for(&"k1".to_string()).len(), 1);

        assert!(index.cancel(&"k1".to_string(), generation));
        assert_eq!(index.pending(), 0);
        assert!(!index.cancel(&"k1".to_string(), generation));
    }

    #[test]
    fn test_clear_empties_all_shards() {
        let index = DeadlineIndex::new(3);
        let deadline = Instant::now() + Duration::from_secs(60);
        for i in 0..30 {
            index.schedule(Expiration {
                deadline,
                generation: Generation::next(),
                key: i,
            });
        }
        assert_eq!(index.pending(), 30);

        index.clear();
        assert_eq!(index.pending(), 0);
    }

    #[test]
    fn test_zero_shards_rounds_up() {
        let index: DeadlineIndex<u32> = DeadlineIndex::new(0);
        assert_eq!(index.shard_count(), 1);
        assert_eq!(index.shard_of(&42), 0);
    }
}
