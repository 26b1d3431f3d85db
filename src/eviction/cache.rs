use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::lru_k::LruKCache;
use super::types::{EvictionSink, Tier};
use crate::error::{CacheError, Result};

/// Thread-safe LRU-K cache.
///
/// One mutex guards the whole structure for the duration of each operation.
/// Evicted pairs are collected while the lock is held and delivered to the
/// sink only after it is released, so a sink may safely call back into the
/// cache.
pub struct EvictionCache {
    inner: Mutex<LruKCache>,
    on_evict: Option<EvictionSink>,
}

impl EvictionCache {
    /// Fails with `CacheError::Config` when `promote_after < 2`.
    pub fn new(promote_after: u32, max_bytes: u64) -> Result<Self> {
        if promote_after < 2 {
            return Err(CacheError::Config(format!(
                "LRU-K needs K >= 2, got {}",
                promote_after
            )));
        }
        Ok(Self {
            inner: Mutex::new(LruKCache::new(promote_after, max_bytes)),
            on_evict: None,
        })
    }

    pub fn with_eviction_sink(mut self, sink: EvictionSink) -> Self {
        self.on_evict = Some(sink);
        self
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.lock().get(key)
    }

    pub fn peek(&self, key: &str) -> Option<Bytes> {
        self.inner.lock().peek(key)
    }

    pub fn set(&self, key: &str, value: Bytes) {
        let evicted = {
            let mut inner = self.inner.lock();
            inner.set(key, value);
            inner.take_evicted()
        };
        self.notify(evicted);
    }

    pub fn remove(&self, key: &str) -> bool {
        let (found, evicted) = {
            let mut inner = self.inner.lock();
            let found = inner.remove(key);
            (found, inner.take_evicted())
        };
        self.notify(evicted);
        found
    }

    pub fn remove_oldest(&self) -> bool {
        let (removed, evicted) = {
            let mut inner = self.inner.lock();
            let removed = inner.remove_oldest();
            (removed, inner.take_evicted())
        };
        self.notify(evicted);
        removed
    }

    /// Point-in-time copy of both tiers.
    pub fn snapshot_all(&self) -> HashMap<String, Bytes> {
        self.inner.lock().snapshot()
    }

    /// Removes and returns every entry whose key satisfies `predicate`.
    /// Extracted pairs are reported to the sink like any other removal.
    pub fn extract_range<F>(&self, predicate: F) -> HashMap<String, Bytes>
    where
        F: FnMut(&str) -> bool,
    {
        let (extracted, evicted) = {
            let mut inner = self.inner.lock();
            let extracted = inner.extract_where(predicate);
            (extracted, inner.take_evicted())
        };
        self.notify(evicted);
        extracted
    }

    /// Replaces the whole content. Dropped entries are not reported; entries
    /// that do not fit the budget are evicted as usual.
    ///
    /// Entries are inserted in map order as fresh candidates with zero touches,
    /// so tier, touch counts and recency of the previous content are not kept.
    /// Which entries survive an over-budget restore is therefore arbitrary.
    pub fn replace_all(&self, entries: HashMap<String, Bytes>) {
        let evicted = {
            let mut inner = self.inner.lock();
            inner.clear();
            for (key, value) in entries {
                inner.set(&key, value);
            }
            inner.take_evicted()
        };
        self.notify(evicted);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn tier(&self, key: &str) -> Option<Tier> {
        self.inner.lock().tier(key)
    }

    pub fn touches(&self, key: &str) -> Option<u32> {
        self.inner.lock().touches(key)
    }

    pub fn keys_in(&self, tier: Tier) -> Vec<String> {
        self.inner.lock().keys_in(tier)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn used_bytes(&self) -> u64 {
        self.inner.lock().used_bytes()
    }

    pub fn max_bytes(&self) -> u64 {
        self.inner.lock().max_bytes()
    }

    pub fn promote_after(&self) -> u32 {
        self.inner.lock().promote_after()
    }

    fn notify(&self, evicted: Vec<(String, Bytes)>) {
        if let Some(sink) = &self.on_evict {
            for (key, value) in evicted {
                sink(&key, &value);
            }
        }
    }
}
