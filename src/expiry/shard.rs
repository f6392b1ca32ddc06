//! One partition of the deadline index.
//!
//! A shard holds pending expirations ordered by `(deadline, generation)`,
//! a back-index for cancelling a specific expiration, and the condition
//! variable its expirer sleeps on. Every operation runs under the shard's
//! mutex, which is a leaf lock: nothing else is locked while holding it.

use crate::storage::Generation;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, trace};

/// A pending expiration: the `(deadline, generation, key)` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiration<K> {
    /// When the entry becomes expired
    pub deadline: Instant,
    /// The `put` this expiration belongs to
    pub generation: Generation,
    /// The key to reclaim
    pub key: K,
}

/// State guarded by the shard mutex.
#[derive(Debug)]
struct ShardState<K> {
    /// Pending expirations in firing order
    queue: BTreeMap<(Instant, Generation), K>,
    /// Generation -> deadline, to find a queue node without scanning.
    /// Generations are process-unique so they identify a node on their own.
    by_generation: HashMap<Generation, Instant>,
    /// Set once the owning worker must exit
    shutdown: bool,
}

impl<K> ShardState<K> {
    fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            by_generation: HashMap::new(),
            shutdown: false,
        }
    }

    fn earliest(&self) -> Option<Instant> {
        self.queue.first_key_value().map(|(&(deadline, _), _)| deadline)
    }

    /// Pops up to `max` expirations due at `now`, in firing order.
    fn drain_due(&mut self, now: Instant, max: usize) -> Vec<Expiration<K>> {
        let mut due = Vec::new();

        while due.len() < max {
            match self.queue.first_entry() {
                Some(first) if first.key().0 <= now => {
                    let ((deadline, generation), key) = first.remove_entry();
                    self.by_generation.remove(&generation);
                    due.push(Expiration {
                        deadline,
                        generation,
                        key,
                    });
                }
                _ => break,
            }
        }

        due
    }
}

/// A deadline-ordered set of pending expirations with its own lock and
/// wakeup signal.
#[derive(Debug)]
pub struct DeadlineShard<K> {
    index: usize,
    state: Mutex<ShardState<K>>,
    wakeup: Condvar,
}

impl<K> DeadlineShard<K> {
    /// Creates an empty shard.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: Mutex::new(ShardState::new()),
            wakeup: Condvar::new(),
        }
    }

    /// Position of this shard in its index.
    pub fn index(&self) -> usize {
        self.index
    }

    fn lock(&self) -> MutexGuard<'_, ShardState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes and returns up to `max` expirations due at `now`, in
    /// non-decreasing deadline order (older generation first on ties).
    pub fn drain_due(&self, now: Instant, max: usize) -> Vec<Expiration<K>> {
        self.lock().drain_due(now, max)
    }

    /// Returns the earliest pending deadline.
    pub fn peek_earliest(&self) -> Option<Instant> {
        self.lock().earliest()
    }

    /// Drops every pending expiration and wakes the worker.
    pub fn clear(&self) {
        let mut state = self.lock();
        if !state.queue.is_empty() {
            debug!(shard = self.index, dropped = state.queue.len(), "Clearing shard");
        }
        state.queue.clear();
        state.by_generation.clear();
        self.wakeup.notify_all();
    }

    /// Number of pending expirations.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Tells the worker to exit at its next wakeup.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        self.wakeup.notify_all();
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.lock().shutdown
    }

    /// Blocks until at least one expiration is due, then drains up to
    /// `max` of them.
    ///
    /// Sleeps without a timeout while the shard is empty and until the
    /// earliest deadline otherwise; any schedule, cancel, or clear that
    /// moves the earliest deadline re-evaluates the wait. Returns `None`
    /// once the shard is shut down.
    pub fn wait_due(&self, max: usize) -> Option<Vec<Expiration<K>>> {
        let mut state = self.lock();

        loop {
            if state.shutdown {
                return None;
            }

            let now = Instant::now();
            let due = state.drain_due(now, max);
            if !due.is_empty() {
                return Some(due);
            }

            state = match state.earliest() {
                None => {
                    trace!(shard = self.index, "Shard empty, waiting for work");
                    self.wakeup
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner)
                }
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(now);
                    trace!(
                        shard = self.index,
                        wait = ?timeout,
                        "Waiting for earliest deadline"
                    );
                    self.wakeup
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }
}

impl<K> DeadlineShard<K>
where
    K: PartialEq + std::fmt::Debug,
{
    /// Inserts an expiration, waking the worker if it is the new earliest.
    pub fn schedule(&self, expiration: Expiration<K>) {
        let mut state = self.lock();
        let Expiration {
            deadline,
            generation,
            key,
        } = expiration;

        trace!(shard = self.index, key = ?key, %generation, "Scheduling expiration");
        state.queue.insert((deadline, generation), key);
        state.by_generation.insert(generation, deadline);

        if state.earliest() == Some(deadline) {
            self.wakeup.notify_one();
        }
    }

    /// Removes the expiration `generation` scheduled for `key`.
    ///
    /// Returns `true` if it was still pending. Wakes the worker if the
    /// earliest deadline changed.
    pub fn cancel(&self, key: &K, generation: Generation) -> bool {
        let mut state = self.lock();

        let Some(&deadline) = state.by_generation.get(&generation) else {
            return false;
        };
        if state.queue.get(&(deadline, generation)) != Some(key) {
            return false;
        }

        let was_earliest = state.earliest() == Some(deadline);
        state.queue.remove(&(deadline, generation));
        state.by_generation.remove(&generation);
        trace!(shard = self.index, key = ?key, %generation, "Cancelled expiration");

        if was_earliest {
            self.wakeup.notify_one();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn expiration(key: &'static str, deadline: Instant) -> Expiration<&'static str> {
        Expiration {
            deadline,
            generation: Generation::next(),
            key,
        }
    }

    #[test]
    fn test_schedule_and_peek() {
        let shard = DeadlineShard::new(0);
        let now = Instant::now();

        assert_eq!(shard.peek_earliest(), None);
        assert!(shard.is_empty());

        shard.schedule(expiration("late", now + Duration::from_secs(10)));
        shard.schedule(expiration("early", now + Duration::from_secs(1)));

        assert_eq!(shard.peek_earliest(), Some(now + Duration::from_secs(1)));
        assert_eq!(shard.len(), 2);
    }

    #[test]
    fn test_drain_due_in_deadline_order() {
        let shard = DeadlineShard::new(0);
        let now = Instant::now();

        shard.schedule(expiration("c", now + Duration::from_millis(3)));
        shard.schedule(expiration("a", now + Duration::from_millis(1)));
        shard.schedule(expiration("future", now + Duration::from_secs(60)));
        shard.schedule(expiration("b", now + Duration::from_millis(2)));

        let due = shard.drain_due(now + Duration::from_millis(5), 100);
        let keys: Vec<_> = due.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        // The future expiration stays
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.peek_earliest(), Some(now + Duration::from_secs(60)));
    }

    #[test]
    fn test_ties_break_by_generation() {
        let shard = DeadlineShard::new(0);
        let deadline = Instant::now();

        let older = expiration("older", deadline);
        let newer = expiration("newer", deadline);
        // Insert the newer one first
        shard.schedule(newer);
        shard.schedule(older);

        let keys: Vec<_> = shard
            .drain_due(deadline, 10)
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["older", "newer"]);
    }

    #[test]
    fn test_drain_respects_batch_bound() {
        let shard = DeadlineShard::new(0);
        let now = Instant::now();

        for _ in 0..10 {
            shard.schedule(expiration("k", now));
        }

        assert_eq!(shard.drain_due(now, 4).len(), 4);
        assert_eq!(shard.drain_due(now, 4).len(), 4);
        assert_eq!(shard.drain_due(now, 4).len(), 2);
        assert!(shard.is_empty());
    }

    #[test]
    fn test_cancel() {
        let shard = DeadlineShard::new(0);
        let now = Instant::now();

        let first = expiration("k1", now + Duration::from_secs(1));
        let second = expiration("k2", now + Duration::from_secs(2));
        let first_generation = first.generation;
        shard.schedule(first);
        shard.schedule(second);

        // Wrong key for the generation: not cancelled
        assert!(!shard.cancel(&"k2", first_generation));

        assert!(shard.cancel(&"k1", first_generation));
        assert_eq!(shard.len(), 1);
        assert_eq!(shard.peek_earliest(), Some(now + Duration::from_secs(2)));

        // Second cancel is a no-op
        assert!(!shard.cancel(&"k1", first_generation));
    }

    #[test]
    fn test_clear() {
        let shard = DeadlineShard::new(0);
        let now = Instant::now();
        shard.schedule(expiration("k1", now));
        shard.schedule(expiration("k2", now));

        shard.clear();
        assert!(shard.is_empty());
        assert_eq!(shard.peek_earliest(), None);
        assert!(shard.drain_due(now + Duration::from_secs(1), 10).is_empty());
    }

    #[test]
    fn test_wait_due_returns_when_deadline_passes() {
        let shard = DeadlineShard::new(0);
        let start = Instant::now();
        shard.schedule(expiration("k", start + Duration::from_millis(50)));

        let due = shard.wait_due(10).unwrap();
        assert_eq!(due.len(), 1);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_wait_due_wakes_on_earlier_schedule() {
        let shard = Arc::new(DeadlineShard::new(0));
        let start = Instant::now();
        shard.schedule(expiration("late", start + Duration::from_secs(30)));

        let waiter = {
            let shard = Arc::clone(&shard);
            thread::spawn(move || shard.wait_due(10))
        };

        thread::sleep(Duration::from_millis(20));
        shard.schedule(expiration("soon", Instant::now() + Duration::from_millis(20)));

        let due = waiter.join().unwrap().unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].key, "soon");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_wait_due_far_deadline_exits_on_shutdown() {
        let shard = Arc::new(DeadlineShard::new(0));
        // Roughly ten years away
        let far = Instant::now() + Duration::from_secs(315_360_000);
        shard.schedule(expiration("far", far));

        let waiter = {
            let shard = Arc::clone(&shard);
            thread::spawn(move || shard.wait_due(10))
        };

        thread::sleep(Duration::from_millis(20));
        shard.shutdown();

        assert!(waiter.join().unwrap().is_none());
        assert_eq!(shard.peek_earliest(), Some(far));
    }

    #[test]
    fn test_wait_due_exits_on_shutdown() {
        let shard: Arc<DeadlineShard<&'static str>> = Arc::new(DeadlineShard::new(0));

        let waiter = {
            let shard = Arc::clone(&shard);
            thread::spawn(move || shard.wait_due(10))
        };

        thread::sleep(Duration::from_millis(20));
        shard.shutdown();

        assert!(waiter.join().unwrap().is_none());
        assert!(shard.is_shut_down());
    }
}
