//! Entry records stored in the mapping.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of generations for the whole process.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identifies one `put` call for the lifetime of the process.
///
/// Generations are strictly increasing, so a newer binding for a key always
/// carries a larger generation than the one it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Allocates a fresh generation.
    pub fn next() -> Self {
        Self(NEXT_GENERATION.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// A live binding: the value plus the deadline it expires at.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    /// The stored value
    pub value: V,
    /// Monotonic instant at which the entry becomes expired
    pub deadline: Instant,
    /// The `put` that created this entry
    pub generation: Generation,
}

impl<V> Entry<V> {
    /// Creates an entry expiring `ttl` after `now`.
    ///
    /// # Panics
    ///
    /// Panics if `now + ttl` cannot be represented by the monotonic clock.
    pub fn new(value: V, now: Instant, ttl: Duration) -> Self {
        let deadline = match now.checked_add(ttl) {
            Some(deadline) => deadline,
            None => panic!("timeout of {ttl:?} overflows the monotonic clock"),
        };
        Self {
            value,
            deadline,
            generation: Generation::next(),
        }
    }

    /// Checks if this entry has expired at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.deadline <= now
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Returns the time left before the deadline, zero once it has passed.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generations_increase() {
        let a = Generation::next();
        let b = Generation::next();
        assert!(b > a);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Instant::now();
        let entry = Entry::new("v", now, Duration::from_millis(100));

        assert!(!entry.is_expired_at(now));
        assert!(!entry.is_expired_at(now + Duration::from_millis(99)));
        // Expired exactly at the deadline
        assert!(entry.is_expired_at(now + Duration::from_millis(100)));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let now = Instant::now();
        let entry = Entry::new(1u32, now, Duration::ZERO);
        assert!(entry.is_expired_at(now));
        assert_eq!(entry.remaining_at(now), Duration::ZERO);
    }

    #[test]
    fn test_remaining() {
        let now = Instant::now();
        let entry = Entry::new((), now, Duration::from_secs(5));
        assert_eq!(entry.remaining_at(now), Duration::from_secs(5));
        assert_eq!(
            entry.remaining_at(now + Duration::from_secs(2)),
            Duration::from_secs(3)
        );
        assert_eq!(
            entry.remaining_at(now + Duration::from_secs(10)),
            Duration::ZERO
        );
    }

    #[test]
    #[should_panic(expected = "overflows the monotonic clock")]
    fn test_unrepresentable_deadline_panics() {
        Entry::new((), Instant::now(), Duration::MAX);
    }
}
