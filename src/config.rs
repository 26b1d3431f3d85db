//! Cache Node Configuration
//!
//! Tunables for the eviction cache, the partition ring, replication and
//! write-back. Every field has a default so a node starts with an empty JSON
//! object (or no config file at all).

use serde::Deserialize;
use std::time::Duration;

use crate::error::{CacheError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Virtual points per real node on the ring (R).
    #[serde(default = "default_replicas")]
    pub replicas: usize,

    /// Touches needed before a candidate entry is promoted to resident (K).
    #[serde(default = "default_promote_after")]
    pub promote_after: u32,

    /// Byte budget for keys plus values. 0 disables eviction.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    #[serde(default = "default_write_back_interval_ms")]
    pub write_back_interval_ms: u64,

    /// Bounded dirty-key queue; keys offered while it is full are dropped.
    #[serde(default = "default_dirty_queue_capacity")]
    pub dirty_queue_capacity: usize,

    #[serde(default = "default_peer_fetch_timeout_ms")]
    pub peer_fetch_timeout_ms: u64,

    #[serde(default = "default_peer_fetch_attempts")]
    pub peer_fetch_attempts: usize,

    /// Timeout of the single, never retried, migration range pull.
    #[serde(default = "default_range_fetch_timeout_ms")]
    pub range_fetch_timeout_ms: u64,

    #[serde(default = "default_consensus_timeout_ms")]
    pub consensus_timeout_ms: u64,

    /// Log entries retained before the local log compacts into a snapshot.
    #[serde(default = "default_snapshot_threshold")]
    pub snapshot_threshold: usize,
}

fn default_replicas() -> usize {
    3
}
fn default_promote_after() -> u32 {
    2
}
fn default_max_bytes() -> u64 {
    64 * 1024 * 1024
}
fn default_write_back_interval_ms() -> u64 {
    10_000
}
fn default_dirty_queue_capacity() -> usize {
    4096
}
fn default_peer_fetch_timeout_ms() -> u64 {
    500
}
fn default_peer_fetch_attempts() -> usize {
    3
}
fn default_range_fetch_timeout_ms() -> u64 {
    30_000
}
fn default_consensus_timeout_ms() -> u64 {
    5_000
}
fn default_snapshot_threshold() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            promote_after: default_promote_after(),
            max_bytes: default_max_bytes(),
            write_back_interval_ms: default_write_back_interval_ms(),
            dirty_queue_capacity: default_dirty_queue_capacity(),
            peer_fetch_timeout_ms: default_peer_fetch_timeout_ms(),
            peer_fetch_attempts: default_peer_fetch_attempts(),
            range_fetch_timeout_ms: default_range_fetch_timeout_ms(),
            consensus_timeout_ms: default_consensus_timeout_ms(),
            snapshot_threshold: default_snapshot_threshold(),
        }
    }
}

impl CacheConfig {
    /// Parses a JSON document; missing fields fall back to defaults.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: CacheConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.promote_after < 2 {
            return Err(CacheError::Config(format!(
                "promote_after must be at least 2, got {}",
                self.promote_after
            )));
        }
        if self.replicas == 0 {
            return Err(CacheError::Config("replicas must be positive".into()));
        }
        if self.dirty_queue_capacity == 0 {
            return Err(CacheError::Config(
                "dirty_queue_capacity must be positive".into(),
            ));
        }
        if self.write_back_interval_ms == 0
            || self.consensus_timeout_ms == 0
            || self.peer_fetch_timeout_ms == 0
            || self.range_fetch_timeout_ms == 0
        {
            return Err(CacheError::Config("intervals must be non-zero".into()));
        }
        if self.peer_fetch_attempts == 0 {
            return Err(CacheError::Config(
                "peer_fetch_attempts must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn write_back_interval(&self) -> Duration {
        Duration::from_millis(self.write_back_interval_ms)
    }

    pub fn peer_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_fetch_timeout_ms)
    }

    pub fn range_fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.range_fetch_timeout_ms)
    }

    pub fn consensus_timeout(&self) -> Duration {
        Duration::from_millis(self.consensus_timeout_ms)
    }
}
