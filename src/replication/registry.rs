//! Cache Registry
//!
//! Maps cache names to live [`EvictionCache`] instances. It lives on the
//! coordinator, so separate coordinators (and tests) never share caches.

use dashmap::DashMap;
use std::sync::Arc;

use crate::eviction::EvictionCache;

pub struct CacheRegistry {
    caches: DashMap<String, Arc<EvictionCache>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self {
            caches: DashMap::new(),
        }
    }

    /// Registers `cache` under `name`, returning the cache it replaced, if any.
    pub fn register(&self, name: &str, cache: Arc<EvictionCache>) -> Option<Arc<EvictionCache>> {
        let previous = self.caches.insert(name.to_string(), cache);
        tracing::info!("Registered cache: {}", name);
        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<EvictionCache>> {
        self.caches.get(name).map(|entry| entry.value().clone())
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<EvictionCache>> {
        self.caches.remove(name).map(|(_, cache)| cache)
    }

    /// Registered names, sorted.
    pub fn list_caches(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .caches
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn has_cache(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
