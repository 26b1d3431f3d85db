//! Eviction Cache Module
//!
//! A byte-bounded in-process cache with LRU-K admission.
//!
//! ## Core Concepts
//! - **Candidate tier**: New entries land here. Recency-ordered; the tail is the
//!   first eviction victim.
//! - **Resident tier**: Entries touched at least K times are promoted here and
//!   never demoted. Only evicted once no candidates remain.
//! - **Byte budget**: Usage is the sum of key and value lengths. After every
//!   insert or update, entries are evicted until usage fits the budget again.
//! - **Eviction sink**: Optional callback receiving every evicted or removed
//!   pair. It runs after the cache lock is released.

pub mod cache;
pub mod lru_k;
pub mod types;

pub use cache::EvictionCache;
pub use types::{CacheEntry, EvictionSink, Tier};
