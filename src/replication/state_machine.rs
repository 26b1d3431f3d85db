//! Apply / Snapshot / Restore adapter
//!
//! The consensus engine drives the cache only through this type. It owns the
//! cache handle and the dirty-key producer and nothing else, so the engine can
//! hold it without referring back to the coordinator.

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::types::{LogEntry, LogOp};
use crate::error::{CacheError, Result};
use crate::eviction::EvictionCache;
use crate::writeback::DirtyKeySender;

pub struct CacheStateMachine {
    cache: Arc<EvictionCache>,
    dirty: DirtyKeySender,
}

impl CacheStateMachine {
    pub fn new(cache: Arc<EvictionCache>, dirty: DirtyKeySender) -> Self {
        Self { cache, dirty }
    }

    /// Applies one committed entry. `ProtocolViolation` is fatal for the caller.
    pub fn apply(&self, raw: &[u8]) -> Result<()> {
        let entry = LogEntry::decode(raw)?;
        match LogOp::try_from(entry.op)? {
            LogOp::Upsert => self.cache.set(&entry.key, Bytes::from(entry.value)),
            LogOp::Remove => {
                self.cache.remove(&entry.key);
            }
        }
        self.dirty.mark(&entry.key);
        Ok(())
    }

    /// Serializes every cached pair. Keys are ordered so equal contents give
    /// equal bytes.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let entries: BTreeMap<String, Vec<u8>> = self
            .cache
            .snapshot_all()
            .into_iter()
            .map(|(key, value)| (key, value.to_vec()))
            .collect();
        Ok(bincode::serialize(&entries)?)
    }

    /// Replaces the cache content with a snapshot.
    pub fn restore(&self, raw: &[u8]) -> Result<()> {
        let entries: BTreeMap<String, Vec<u8>> = bincode::deserialize(raw)
            .map_err(|e| CacheError::Codec(format!("corrupt snapshot: {}", e)))?;
        let count = entries.len();
        let entries: HashMap<String, Bytes> = entries
            .into_iter()
            .map(|(key, value)| (key, Bytes::from(value)))
            .collect();
        self.cache.replace_all(entries);
        tracing::info!("Restored {} entries from snapshot", count);
        Ok(())
    }

    pub fn cache(&self) -> &Arc<EvictionCache> {
        &self.cache
    }
}
