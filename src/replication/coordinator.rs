use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;

use super::consensus::ConsensusLog;
use super::peer::PeerClient;
use super::protocol::SetRequest;
use super::registry::CacheRegistry;
use super::state_machine::CacheStateMachine;
use super::types::{LogEntry, LogOp, NodeRole};
use crate::collapser::RequestCollapser;
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::eviction::{EvictionCache, EvictionSink};
use crate::ring::{NodeId, PartitionRing, hash_key};
use crate::writeback::{DirtyKeyQueue, DurableStore, WriteBackScheduler};

/// Registry name of the coordinator's own cache.
pub const DEFAULT_CACHE: &str = "default";

/// Node-local pieces the consensus engine needs before the coordinator exists.
pub struct LocalState {
    pub cache: Arc<EvictionCache>,
    pub dirty: DirtyKeyQueue,
    pub state_machine: Arc<CacheStateMachine>,
}

impl LocalState {
    pub fn new(config: &CacheConfig, on_evict: Option<EvictionSink>) -> Result<Self> {
        config.validate()?;
        let mut cache = EvictionCache::new(config.promote_after, config.max_bytes)?;
        if let Some(sink) = on_evict {
            cache = cache.with_eviction_sink(sink);
        }
        let cache = Arc::new(cache);
        let dirty = DirtyKeyQueue::new(config.dirty_queue_capacity);
        let state_machine = Arc::new(CacheStateMachine::new(cache.clone(), dirty.sender()));
        Ok(Self {
            cache,
            dirty,
            state_machine,
        })
    }
}

/// Top-level façade of a cache node.
///
/// Writes are accepted only while this node holds leadership and travel
/// through the consensus log; the cache is mutated when the entry is applied.
/// Reads hit the local cache first and fall back to one collapsed remote fetch.
pub struct ReplicationCoordinator {
    pub(super) local: NodeId,
    master: RwLock<Option<NodeId>>,
    config: CacheConfig,
    cache: Arc<EvictionCache>,
    registry: CacheRegistry,
    pub(super) ring: RwLock<PartitionRing>,
    collapser: RequestCollapser<Option<Bytes>>,
    state_machine: Arc<CacheStateMachine>,
    consensus: Arc<dyn ConsensusLog>,
    pub(super) peers: Arc<dyn PeerClient>,
    store: Arc<dyn DurableStore>,
    dirty: DirtyKeyQueue,
    write_enabled: AtomicBool,
    write_back: tokio::sync::Mutex<Option<WriteBackScheduler>>,
}

impl ReplicationCoordinator {
    /// Starts as a follower on a ring that contains only this node.
    pub fn new(
        local: NodeId,
        config: CacheConfig,
        state: LocalState,
        consensus: Arc<dyn ConsensusLog>,
        peers: Arc<dyn PeerClient>,
        store: Arc<dyn DurableStore>,
    ) -> Arc<Self> {
        let registry = CacheRegistry::new();
        registry.register(DEFAULT_CACHE, state.cache.clone());

        let mut ring = PartitionRing::new(config.replicas);
        ring.add_node(&local);

        Arc::new(Self {
            local,
            master: RwLock::new(None),
            config,
            cache: state.cache,
            registry,
            ring: RwLock::new(ring),
            collapser: RequestCollapser::new(),
            state_machine: state.state_machine,
            consensus,
            peers,
            store,
            dirty: state.dirty,
            write_enabled: AtomicBool::new(false),
            write_back: tokio::sync::Mutex::new(None),
        })
    }

    // --- Reads ---

    /// Local hit, else a collapsed fetch from the routing hint or ring owner.
    /// Remote values are returned but not cached. Failures read as a miss.
    pub async fn do_get(&self, key: &str, routing_hint: Option<&NodeId>) -> Option<Bytes> {
        if key.is_empty() {
            return None;
        }
        if let Some(value) = self.cache.get(key) {
            tracing::debug!("GET: '{}' served locally", key);
            return Some(value);
        }

        let target = match routing_hint.filter(|hint| *hint != &self.local) {
            Some(hint) => hint.clone(),
            None => {
                let ring = self.ring.read();
                match ring.owner(key) {
                    Some(owner) if owner != &self.local => owner.clone(),
                    _ => {
                        tracing::debug!("GET: '{}' not found and owned locally", key);
                        return None;
                    }
                }
            }
        };

        let peers = self.peers.clone();
        let fetch_key = key.to_string();
        let source = target.clone();
        let result = self
            .collapser
            .run(key, || async move { peers.fetch(&source, &fetch_key).await })
            .await;

        match result {
            Ok(value) => {
                tracing::debug!("GET: '{}' fetched from {} (found={})", key, target, value.is_some());
                value
            }
            Err(e) => {
                tracing::warn!("GET: remote fetch of '{}' from {} failed: {}", key, target, e);
                None
            }
        }
    }

    /// Local cache only. Serves peer reads.
    pub fn get_local(&self, key: &str) -> Option<Bytes> {
        self.cache.get(key)
    }

    // --- Writes ---

    pub async fn do_set(&self, op: LogOp, key: &str, value: &[u8]) -> bool {
        match self.try_set(op, key, value).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("SET '{}' failed: {}", key, e);
                false
            }
        }
    }

    /// Like [`do_set`](Self::do_set) but reports why a write failed.
    pub async fn try_set(&self, op: LogOp, key: &str, value: &[u8]) -> Result<()> {
        if !self.is_write_enabled() {
            return Err(CacheError::WriteRejected(format!(
                "{} is not the write leader",
                self.local
            )));
        }
        if key.is_empty() {
            return Err(CacheError::WriteRejected("empty key".into()));
        }
        if value.is_empty() {
            return Err(CacheError::WriteRejected("empty value".into()));
        }
        self.submit_entry(&LogEntry::new(op, key, value)).await
    }

    /// Applies a client write here, or forwards it once to the key's ring owner.
    pub async fn route_set(&self, request: SetRequest) -> Result<()> {
        let op = LogOp::try_from(request.op)
            .map_err(|_| CacheError::WriteRejected(format!("unknown opcode {}", request.op)))?;

        if !request.forwarded
            && let Some(owner) = self.owner_of(&request.key)
            && owner != self.local
        {
            tracing::debug!("SET: forwarding '{}' to owner {}", request.key, owner);
            let forwarded = SetRequest {
                forwarded: true,
                ..request
            };
            return match self.peers.forward_set(&owner, &forwarded).await? {
                true => Ok(()),
                false => Err(CacheError::WriteRejected(format!(
                    "owner {} rejected the write",
                    owner
                ))),
            };
        }

        self.try_set(op, &request.key, request.value.as_bytes())
            .await
    }

    pub(super) async fn submit_entry(&self, entry: &LogEntry) -> Result<()> {
        let raw = entry.encode()?;
        self.consensus
            .submit(raw, self.config.consensus_timeout())
            .await
    }

    pub async fn do_join(&self, peer: &NodeId) -> bool {
        match self.consensus.add_voter(peer).await {
            Ok(()) => {
                tracing::info!("Peer {} joined the consensus group", peer);
                true
            }
            Err(e) => {
                tracing::warn!("Join of {} failed: {}", peer, e);
                false
            }
        }
    }

    // --- Leadership ---

    pub fn set_write_enabled(&self, enabled: bool) {
        self.write_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_write_enabled(&self) -> bool {
        self.write_enabled.load(Ordering::SeqCst)
    }

    /// True while the consensus log will commit entries submitted here.
    pub fn log_accepts_entries(&self) -> bool {
        *self.consensus.leadership().borrow()
    }

    pub fn role(&self) -> NodeRole {
        if self.is_write_enabled() {
            NodeRole::Leader
        } else {
            NodeRole::Follower
        }
    }

    /// Leader: accept writes and run write-back. Follower: refuse writes and
    /// stop write-back after a final flush.
    pub async fn on_leadership_change(&self, is_leader: bool) {
        self.set_write_enabled(is_leader);
        let mut write_back = self.write_back.lock().await;

        if is_leader {
            if write_back.is_none() {
                *write_back = Some(WriteBackScheduler::start(
                    self.dirty.clone(),
                    self.cache.clone(),
                    self.store.clone(),
                    self.config.write_back_interval(),
                ));
                tracing::info!("{} is now leader, writes enabled", self.local);
            }
        } else if let Some(scheduler) = write_back.take() {
            let report = scheduler.close().await;
            tracing::info!(
                "{} stepped down, flushed {} dirty keys",
                self.local,
                report.flushed
            );
        }
    }

    /// Follows the consensus engine's leadership channel until it closes.
    pub fn watch_leadership(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut leadership = self.consensus.leadership();

        tokio::spawn(async move {
            let initial = *leadership.borrow_and_update();
            coordinator.on_leadership_change(initial).await;

            while leadership.changed().await.is_ok() {
                let is_leader = *leadership.borrow_and_update();
                coordinator.on_leadership_change(is_leader).await;
            }
            tracing::debug!("Leadership channel closed");
        })
    }

    /// Stops accepting writes and flushes pending write-back.
    pub async fn shutdown(&self) {
        self.on_leadership_change(false).await;
    }

    // --- Migration source ---

    /// Removes and returns every local entry whose key hash is in `[start, end]`.
    pub fn extract_range(&self, start: u32, end: u32) -> HashMap<String, Bytes> {
        let range = start..=end;
        let extracted = self
            .cache
            .extract_range(|key| range.contains(&hash_key(key)));
        tracing::info!(
            "Extracted {} entries in hash range [{}, {}]",
            extracted.len(),
            start,
            end
        );
        extracted
    }

    // --- Accessors ---

    pub fn local_id(&self) -> &NodeId {
        &self.local
    }

    pub fn master(&self) -> Option<NodeId> {
        self.master.read().clone()
    }

    /// Node that reads are routed to on a local miss, ahead of the ring.
    pub fn set_master(&self, master: Option<NodeId>) {
        *self.master.write() = master;
    }

    pub fn cache(&self) -> &Arc<EvictionCache> {
        &self.cache
    }

    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    pub fn state_machine(&self) -> &Arc<CacheStateMachine> {
        &self.state_machine
    }

    pub fn consensus(&self) -> &Arc<dyn ConsensusLog> {
        &self.consensus
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn in_flight_fetches(&self) -> usize {
        self.collapser.in_flight()
    }
}
