use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Candidate,
    Resident,
}

/// A cached pair plus its admission metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Bytes,
    /// Touches since insertion. Reaching K moves the entry to `Tier::Resident`.
    pub touches: u32,
    pub tier: Tier,
}

impl CacheEntry {
    pub fn new(key: String, value: Bytes) -> Self {
        Self {
            key,
            value,
            touches: 0,
            tier: Tier::Candidate,
        }
    }

    /// Bytes charged against the budget.
    pub fn size(&self) -> u64 {
        (self.key.len() + self.value.len()) as u64
    }
}

/// Callback invoked with every pair leaving the cache through eviction or removal.
pub type EvictionSink = Arc<dyn Fn(&str, &Bytes) + Send + Sync>;
