//! Operation counters for an expiring map.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters shared by the façade and the expirer threads.
#[derive(Debug, Default)]
pub struct StatsCounter {
    puts: AtomicU64,
    gets: AtomicU64,
    hits: AtomicU64,
    removes: AtomicU64,
    expired: AtomicU64,
    stale: AtomicU64,
    rescheduled: AtomicU64,
}

impl StatsCounter {
    /// Creates a counter set with every count at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one `put`.
    #[inline]
    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one `get`, and a hit if it returned a value.
    #[inline]
    pub fn record_get(&self, hit: bool) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counts one `remove` that found a binding.
    #[inline]
    pub fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one entry reclaimed by an expirer.
    #[inline]
    pub fn record_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one expiration discarded as stale or absent.
    #[inline]
    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one expiration put back in the index.
    #[inline]
    pub fn record_rescheduled(&self) {
        self.rescheduled.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot, filling in the gauges the caller
    /// reads from the mapping and the index.
    pub fn snapshot(&self, entries: usize, pending: usize) -> ExpireMapStats {
        ExpireMapStats {
            entries,
            pending,
            puts: self.puts.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            rescheduled: self.rescheduled.load(Ordering::Relaxed),
        }
    }
}

/// Expiring map statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpireMapStats {
    /// Entries in the mapping, including expired ones not yet reclaimed
    pub entries: usize,
    /// Expirations held by the deadline index, live and stale
    pub pending: usize,
    /// Total `put` calls
    pub puts: u64,
    /// Total `get` calls
    pub gets: u64,
    /// `get` calls that returned a value
    pub hits: u64,
    /// `remove` calls that removed a binding
    pub removes: u64,
    /// Entries reclaimed by the expirers
    pub expired: u64,
    /// Expirations discarded because their entry was replaced or removed
    pub stale: u64,
    /// Expirations fired early and put back in the index
    pub rescheduled: u64,
}

impl ExpireMapStats {
    /// `hits / gets`, or `0.0` before the first `get`.
    pub fn hit_rate(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.hits as f64 / self.gets as f64
        }
    }
}
