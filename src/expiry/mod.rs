//! Eviction Engine Module
//!
//! The deadline index and the threads that act on it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     DeadlineIndex                           │
//! │  ┌───────────┐ ┌───────────┐ ┌───────────┐ ┌───────────┐   │
//! │  │ Shard 0   │ │ Shard 1   │ │ Shard 2   │ │ Shard N-1 │   │
//! │  │ Mutex     │ │ Mutex     │ │ Mutex     │ │ Mutex     │   │
//! │  │ BTreeMap  │ │ BTreeMap  │ │ BTreeMap  │ │ BTreeMap  │   │
//! │  │ Condvar   │ │ Condvar   │ │ Condvar   │ │ Condvar   │   │
//! │  └─────┬─────┘ └─────┬─────┘ └─────┬─────┘ └─────┬─────┘   │
//! └────────┼─────────────┼─────────────┼─────────────┼─────────┘
//!          ▼             ▼             ▼             ▼
//!     expirer-0     expirer-1     expirer-2     expirer-N-1
//!          │             │             │             │
//!          └─────────────┴──────┬──────┴─────────────┘
//!                               ▼
//!                  mapping.remove_if(key, same generation)
//! ```
//!
//! ## Features
//!
//! - **Key Sharding**: all expirations of a key live in one shard, so
//!   cancelling by key takes one lock
//! - **Exact Wakeups**: a worker sleeps until its shard's earliest
//!   deadline and is re-signalled only when that deadline moves
//! - **Bounded Batches**: at most `max_batch` expirations are drained per
//!   lock acquisition
//! - **Leaf Locks**: the shard lock is never held across a mapping call

pub mod index;
pub mod shard;
pub mod worker;

// Re-export commonly used types
pub use index::DeadlineIndex;
pub use shard::{DeadlineShard, Expiration};
pub use worker::{reclaim, ExpirerPool, Reclaim};
