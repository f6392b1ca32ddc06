//! Expirer threads.
//!
//! Each deadline shard is served by one OS thread that sleeps until the
//! shard's earliest deadline, drains what is due, and reclaims the
//! matching entries from the mapping after releasing the shard lock.
//!
//! ## Conditional Reclamation
//!
//! `put` does not cancel the expiration of the binding it replaces, so a
//! drained expiration may be stale. Before deleting anything the worker
//! re-reads the entry and only removes it if it is still the same
//! generation:
//!
//! ```text
//!   drained (deadline, generation, key)
//!            │
//!            ▼
//!   mapping.get(key) ── none ──────────────────> Absent
//!            │
//!            ├── generation differs ───────────> Stale
//!            │
//!            ├── deadline still ahead ─────────> Rescheduled
//!            │
//!            ▼
//!   mapping.remove_if(key, same generation) ─┬─> Fired
//!                                            └─> Stale (replaced meanwhile)
//! ```

use crate::config::ExpireMapConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::expiry::index::DeadlineIndex;
use crate::expiry::shard::{DeadlineShard, Expiration};
use crate::stats::StatsCounter;
use crate::storage::{Entry, Mapping};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// What happened to one drained expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reclaim {
    /// The entry was expired and has been removed
    Fired,
    /// The key had no entry any more
    Absent,
    /// The key is bound to a newer generation
    Stale,
    /// The entry is not due yet and was scheduled again
    Rescheduled,
}

/// Reclaims the entry an expiration refers to, if it is still the live,
/// expired binding for its key.
///
/// Must be called without holding the shard lock.
pub fn reclaim<K, V, M>(
    mapping: &M,
    shard: &DeadlineShard<K>,
    expiration: Expiration<K>,
) -> Reclaim
where
    K: PartialEq + Debug,
    M: Mapping<K, Arc<Entry<V>>> + ?Sized,
{
    let Some(entry) = mapping.get(&expiration.key) else {
        trace!(key = ?expiration.key, generation = %expiration.generation, "Entry already removed");
        return Reclaim::Absent;
    };

    if entry.generation != expiration.generation {
        trace!(
            key = ?expiration.key,
            generation = %expiration.generation,
            current = %entry.generation,
            "Discarding stale expiration"
        );
        return Reclaim::Stale;
    }

    if !entry.is_expired_at(Instant::now()) {
        debug!(key = ?expiration.key, generation = %expiration.generation, "Entry not due yet, rescheduling");
        shard.schedule(Expiration {
            deadline: entry.deadline,
            ..expiration
        });
        return Reclaim::Rescheduled;
    }

    let generation = expiration.generation;
    if mapping.remove_if(&expiration.key, &|current| current.generation == generation) {
        trace!(key = ?expiration.key, %generation, "Entry expired");
        Reclaim::Fired
    } else {
        trace!(key = ?expiration.key, %generation, "Entry replaced before removal");
        Reclaim::Stale
    }
}

/// Services one shard until it is shut down.
fn expirer_loop<K, V, M>(
    shard: Arc<DeadlineShard<K>>,
    mapping: Arc<M>,
    stats: Arc<StatsCounter>,
    max_batch: usize,
) where
    K: PartialEq + Debug,
    M: Mapping<K, Arc<Entry<V>>> + ?Sized,
{
    info!(shard = shard.index(), "Expirer started");

    while let Some(batch) = shard.wait_due(max_batch) {
        debug!(shard = shard.index(), due = batch.len(), "Reclaiming batch");

        for expiration in batch {
            match reclaim::<K, V, M>(&mapping, &shard, expiration) {
                Reclaim::Fired => stats.record_expired(),
                Reclaim::Absent | Reclaim::Stale => stats.record_stale(),
                Reclaim::Rescheduled => stats.record_rescheduled(),
            }
        }
    }

    info!(
        shard = shard.index(),
        discarded = shard.len(),
        "Expirer stopped"
    );
}

/// The running expirer threads, one per shard.
///
/// Stopping is two-step: the owner signals the shards through
/// [`DeadlineIndex::shutdown`], then calls [`join`](Self::join).
#[derive(Debug)]
pub struct ExpirerPool {
    handles: Vec<JoinHandle<()>>,
}

impl ExpirerPool {
    /// Spawns one expirer per shard of `index`.
    ///
    /// If a thread cannot be spawned, the ones already running are
    /// stopped and joined before the error is returned.
    pub fn start<K, V, M>(
        index: &DeadlineIndex<K>,
        mapping: Arc<M>,
        stats: Arc<StatsCounter>,
        config: &ExpireMapConfig,
    ) -> ConfigResult<Self>
    where
        K: Hash + PartialEq + Debug + Send + Sync + 'static,
        V: Send + Sync + 'static,
        M: Mapping<K, Arc<Entry<V>>> + ?Sized + 'static,
    {
        let mut pool = Self {
            handles: Vec::with_capacity(index.shard_count()),
        };

        for shard in index.shards() {
            let shard_index = shard.index();
            let shard = Arc::clone(shard);
            let mapping = Arc::clone(&mapping);
            let stats = Arc::clone(&stats);
            let max_batch = config.max_batch;

            let spawned = thread::Builder::new()
                .name(config.thread_name(shard_index))
                .spawn(move || expirer_loop::<K, V, M>(shard, mapping, stats, max_batch));

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(source) => {
                    warn!(shard = shard_index, error = %source, "Failed to spawn expirer");
                    index.shutdown();
                    pool.join();
                    return Err(ConfigError::WorkerSpawn {
                        shard: shard_index,
                        source,
                    });
                }
            }
        }

        Ok(pool)
    }

    /// Number of threads not yet joined.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true once every thread has been joined.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every expirer to exit. Idempotent.
    pub fn join(&mut self) {
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Expirer thread panicked");
            }
        }
    }
}
