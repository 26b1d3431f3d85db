//! Consensus Log Seam
//!
//! The coordinator talks to its replication engine through [`ConsensusLog`].
//! Election, quorum and replication live behind the trait; the engine calls
//! back into [`CacheStateMachine`] for every committed entry and publishes
//! leadership changes on a watch channel.
//!
//! [`LocalLog`] is a single-voter engine: every submitted entry commits
//! immediately, in submission order. It also keeps the log tail since its last
//! snapshot so a node can rebuild its cache with [`LocalLog::recover`].

use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};

use super::state_machine::CacheStateMachine;
use crate::error::{CacheError, Result};
use crate::ring::NodeId;

#[async_trait]
pub trait ConsensusLog: Send + Sync {
    /// Returns once the entry is committed and applied, or fails after `timeout`.
    async fn submit(&self, entry: Vec<u8>, timeout: Duration) -> Result<()>;

    /// Adds `peer` as a voting member.
    async fn add_voter(&self, peer: &NodeId) -> Result<()>;

    /// Starts a fresh cluster with this node as its only member.
    async fn bootstrap(&self) -> Result<()>;

    /// `true` while this node is the leader.
    fn leadership(&self) -> watch::Receiver<bool>;
}

/// Log position and compaction state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogStatus {
    pub applied_index: u64,
    pub snapshot_index: u64,
    pub retained_entries: usize,
}

struct LogState {
    applied_index: u64,
    snapshot_index: u64,
    snapshot: Option<Vec<u8>>,
    entries: Vec<Vec<u8>>,
}

pub struct LocalLog {
    state_machine: Arc<CacheStateMachine>,
    state: Mutex<LogState>,
    leader: watch::Sender<bool>,
    voters: DashSet<NodeId>,
    snapshot_threshold: usize,
}

impl LocalLog {
    pub fn new(state_machine: Arc<CacheStateMachine>, snapshot_threshold: usize) -> Self {
        let (leader, _) = watch::channel(false);
        Self {
            state_machine,
            state: Mutex::new(LogState {
                applied_index: 0,
                snapshot_index: 0,
                snapshot: None,
                entries: Vec::new(),
            }),
            leader,
            voters: DashSet::new(),
            snapshot_threshold: snapshot_threshold.max(1),
        }
    }

    pub fn is_leader(&self) -> bool {
        *self.leader.borrow()
    }

    /// Gives up leadership; subscribers see `false`.
    pub fn step_down(&self) {
        if self.leader.send_replace(false) {
            tracing::info!("Local log stepped down");
        }
    }

    pub fn voters(&self) -> Vec<NodeId> {
        let mut voters: Vec<NodeId> = self.voters.iter().map(|v| v.key().clone()).collect();
        voters.sort();
        voters
    }

    pub async fn status(&self) -> LogStatus {
        let state = self.state.lock().await;
        LogStatus {
            applied_index: state.applied_index,
            snapshot_index: state.snapshot_index,
            retained_entries: state.entries.len(),
        }
    }

    /// Rebuilds the state machine from the last snapshot plus the retained
    /// tail. Returns the number of replayed entries.
    pub async fn recover(&self) -> Result<usize> {
        let state = self.state.lock().await;
        match &state.snapshot {
            Some(snapshot) => self.state_machine.restore(snapshot)?,
            None => self.state_machine.cache().clear(),
        }
        for entry in &state.entries {
            self.state_machine.apply(entry)?;
        }
        tracing::info!(
            "Recovered from snapshot at index {} plus {} entries",
            state.snapshot_index,
            state.entries.len()
        );
        Ok(state.entries.len())
    }

    async fn commit(&self, entry: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock().await;
        let index = state.applied_index + 1;

        if let Err(e) = self.state_machine.apply(&entry) {
            if e.is_fatal() {
                tracing::error!("Fatal error applying log index {}: {}", index, e);
                std::process::abort();
            }
            return Err(e);
        }
        state.entries.push(entry);
        state.applied_index = index;

        if state.entries.len() >= self.snapshot_threshold {
            let snapshot = self.state_machine.snapshot()?;
            state.snapshot = Some(snapshot);
            state.snapshot_index = index;
            state.entries.clear();
            tracing::debug!("Compacted log at index {}", index);
        }
        Ok(())
    }
}

#[async_trait]
impl ConsensusLog for LocalLog {
    async fn submit(&self, entry: Vec<u8>, timeout: Duration) -> Result<()> {
        if !self.is_leader() {
            return Err(CacheError::Consensus("not the leader".into()));
        }
        match tokio::time::timeout(timeout, self.commit(entry)).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::ConsensusTimeout(timeout)),
        }
    }

    async fn add_voter(&self, peer: &NodeId) -> Result<()> {
        if !self.is_leader() {
            return Err(CacheError::Consensus(format!(
                "cannot add voter {}: not the leader",
                peer
            )));
        }
        if self.voters.insert(peer.clone()) {
            tracing::info!("Added voter {}", peer);
        }
        Ok(())
    }

    async fn bootstrap(&self) -> Result<()> {
        self.leader.send_replace(true);
        tracing::info!("Bootstrapped single-node log, now leader");
        Ok(())
    }

    fn leadership(&self) -> watch::Receiver<bool> {
        self.leader.subscribe()
    }
}
