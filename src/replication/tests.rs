//! Replication Module Tests
//!
//! Runs small in-process clusters: every node is a real `ReplicationCoordinator`
//! with a `LocalLog`, and peer calls are dispatched directly to the target
//! coordinator instead of over HTTP.
//!
//! ## Test Scopes
//! - **State machine**: apply, snapshot/restore, opcode validation.
//! - **Write gate**: leadership, input validation, consensus timeouts.
//! - **Reads**: local hits, ring-routed remote fetches, collapsing.
//! - **Topology**: ring sharing, range migration, forwarded writes.

#[cfg(test)]
mod tests {
    use crate::config::CacheConfig;
    use crate::error::{CacheError, Result};
    use crate::replication::protocol::{RingSyncReport, SetRequest};
    use crate::replication::{
        CacheRegistry, ConsensusLog, DEFAULT_CACHE, LocalLog, LocalState, LogEntry, LogOp,
        NodeRole, PeerClient, ReplicationCoordinator,
    };
    use crate::eviction::EvictionCache;
    use crate::ring::{MigrationRange, NodeId, PartitionRing, hash_key};
    use crate::writeback::MemoryStore;
    use async_trait::async_trait;
    use bytes::Bytes;
    use dashmap::DashMap;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Weak};
    use std::time::Duration;
    use tokio::sync::watch;

    // ============================================================
    // TEST HARNESS
    // ============================================================

    /// Routes peer calls straight to registered coordinators.
    #[derive(Default)]
    struct InProcessPeers {
        nodes: DashMap<NodeId, Weak<ReplicationCoordinator>>,
        fetches: AtomicUsize,
        fetch_delay: Duration,
    }

    impl InProcessPeers {
        fn with_delay(fetch_delay: Duration) -> Self {
            Self {
                fetch_delay,
                ..Default::default()
            }
        }

        fn register(&self, node: &Arc<ReplicationCoordinator>) {
            self.nodes
                .insert(node.local_id().clone(), Arc::downgrade(node));
        }

        fn node(&self, id: &NodeId) -> Result<Arc<ReplicationCoordinator>> {
            self.nodes
                .get(id)
                .and_then(|weak| weak.upgrade())
                .ok_or_else(|| CacheError::Network(format!("{} unreachable", id)))
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PeerClient for InProcessPeers {
        async fn fetch(&self, peer: &NodeId, key: &str) -> Result<Option<Bytes>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.fetch_delay.is_zero() {
                tokio::time::sleep(self.fetch_delay).await;
            }
            Ok(self.node(peer)?.get_local(key))
        }

        async fn fetch_range(&self, peer: &NodeId, range: &MigrationRange) -> Result<HashMap<String, Bytes>> {
            Ok(self.node(peer)?.extract_range(range.start, range.end))
        }

        async fn forward_set(&self, peer: &NodeId, request: &SetRequest) -> Result<bool> {
            Ok(self.node(peer)?.route_set(request.clone()).await.is_ok())
        }

        async fn push_ring(&self, peer: &NodeId, ring: &PartitionRing) -> Result<RingSyncReport> {
            self.node(peer)?.join_ring(ring.clone()).await
        }

        async fn announce(&self, peer: &NodeId, joined: &NodeId) -> Result<()> {
            self.node(peer)?.add_peer(joined);
            Ok(())
        }

        async fn request_join(&self, leader: &NodeId, joiner: &NodeId) -> Result<()> {
            if self.node(leader)?.do_join(joiner).await {
                Ok(())
            } else {
                Err(CacheError::Consensus("join refused".into()))
            }
        }

        async fn request_ring(&self, source: &NodeId, dest: &NodeId) -> Result<()> {
            self.node(source)?.share_ring(dest).await.map(|_| ())
        }
    }

    /// Never commits anything.
    struct StalledLog {
        leader: watch::Sender<bool>,
    }

    #[async_trait]
    impl ConsensusLog for StalledLog {
        async fn submit(&self, _entry: Vec<u8>, timeout: Duration) -> Result<()> {
            match tokio::time::timeout(timeout, std::future::pending::<()>()).await {
                Ok(()) => Ok(()),
                Err(_) => Err(CacheError::ConsensusTimeout(timeout)),
            }
        }

        async fn add_voter(&self, _peer: &NodeId) -> Result<()> {
            Err(CacheError::Consensus("stalled".into()))
        }

        async fn bootstrap(&self) -> Result<()> {
            self.leader.send_replace(true);
            Ok(())
        }

        fn leadership(&self) -> watch::Receiver<bool> {
            self.leader.subscribe()
        }
    }

    struct TestNode {
        coord: Arc<ReplicationCoordinator>,
        log: Arc<LocalLog>,
        store: Arc<MemoryStore>,
    }

    fn test_config() -> CacheConfig {
        CacheConfig {
            consensus_timeout_ms: 200,
            write_back_interval_ms: 3_600_000,
            snapshot_threshold: 4,
            ..Default::default()
        }
    }

    async fn spawn_node(addr: &str, peers: &Arc<InProcessPeers>, leader: bool) -> TestNode {
        let config = test_config();
        let state = LocalState::new(&config, None).unwrap();
        let log = Arc::new(LocalLog::new(
            state.state_machine.clone(),
            config.snapshot_threshold,
        ));
        let store = Arc::new(MemoryStore::new());
        let coord = ReplicationCoordinator::new(
            NodeId::from(addr),
            config,
            state,
            log.clone(),
            peers.clone(),
            store.clone(),
        );
        peers.register(&coord);

        if leader {
            log.bootstrap().await.unwrap();
            coord.on_leadership_change(true).await;
        }
        TestNode { coord, log, store }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    /// A key that `node`'s ring assigns to `owner`.
    fn key_owned_by(node: &ReplicationCoordinator, owner: &NodeId) -> String {
        (0..10_000)
            .map(|i| format!("key{}", i))
            .find(|key| node.owner_of(key).as_ref() == Some(owner))
            .expect("some key maps to the owner")
    }

    // ============================================================
    // STATE MACHINE TESTS
    // ============================================================

    #[test]
    fn test_opcode_mapping() {
        assert_eq!(LogOp::try_from(0).unwrap(), LogOp::Upsert);
        assert_eq!(LogOp::try_from(1).unwrap(), LogOp::Upsert);
        assert_eq!(LogOp::try_from(2).unwrap(), LogOp::Remove);
        assert!(matches!(
            LogOp::try_from(3),
            Err(CacheError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_apply_rejects_unknown_opcode_as_fatal() {
        let state = LocalState::new(&test_config(), None).unwrap();
        let entry = LogEntry {
            op: 9,
            key: "k".into(),
            value: b"v".to_vec(),
        };

        let err = state
            .state_machine
            .apply(&entry.encode().unwrap())
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(state.cache.is_empty());
    }

    #[test]
    fn test_apply_rejects_garbage_bytes() {
        let state = LocalState::new(&test_config(), None).unwrap();
        let err = state.state_machine.apply(&[0xff, 0x01]).unwrap_err();
        assert!(matches!(err, CacheError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_apply_upsert_and_remove_mark_dirty() {
        let state = LocalState::new(&test_config(), None).unwrap();
        let upsert = LogEntry::new(LogOp::Upsert, "a", b"1").encode().unwrap();
        let remove = LogEntry::new(LogOp::Remove, "a", b"1").encode().unwrap();

        state.state_machine.apply(&upsert).unwrap();
        assert_eq!(state.cache.peek("a"), Some(Bytes::from_static(b"1")));
        state.state_machine.apply(&remove).unwrap();
        assert!(state.cache.peek("a").is_none());

        let dirty = state.dirty.drain().await;
        assert_eq!(dirty, vec!["a".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_snapshot_restore_reproduces_contents() {
        let source = LocalState::new(&test_config(), None).unwrap();
        for (k, v) in [("a", "1"), ("b", "22"), ("c", "")] {
            source.cache.set(k, Bytes::copy_from_slice(v.as_bytes()));
        }
        let snapshot = source.state_machine.snapshot().unwrap();

        let target = LocalState::new(&test_config(), None).unwrap();
        target.state_machine.restore(&snapshot).unwrap();

        assert_eq!(target.cache.snapshot_all(), source.cache.snapshot_all());
        assert_eq!(target.cache.used_bytes(), source.cache.used_bytes());
    }

    #[test]
    fn test_restore_replaces_existing_entries() {
        let source = LocalState::new(&test_config(), None).unwrap();
        source.cache.set("fresh", Bytes::from_static(b"1"));
        let snapshot = source.state_machine.snapshot().unwrap();

        let target = LocalState::new(&test_config(), None).unwrap();
        target.cache.set("stale", Bytes::from_static(b"0"));
        target.state_machine.restore(&snapshot).unwrap();

        assert!(target.cache.peek("stale").is_none());
        assert!(target.cache.peek("fresh").is_some());
    }

    // ============================================================
    // LOCAL LOG TESTS
    // ============================================================

    #[tokio::test]
    async fn test_local_log_compacts_and_recovers() {
        let peers = Arc::new(InProcessPeers::default());
        let node = spawn_node("10.0.0.1:7000", &peers, true).await;

        for i in 0..6 {
            let key = format!("k{}", i);
            assert!(node.coord.do_set(LogOp::Upsert, &key, b"v").await);
        }
        let status = node.log.status().await;
        assert_eq!(status.applied_index, 6);
        assert_eq!(status.snapshot_index, 4);
        assert_eq!(status.retained_entries, 2);

        let before = node.coord.cache().snapshot_all();
        node.coord.cache().clear();
        assert_eq!(node.log.recover().await.unwrap(), 2);
        assert_eq!(node.coord.cache().snapshot_all(), before);
    }

    #[tokio::test]
    async fn test_local_log_refuses_when_not_leader() {
        let state = LocalState::new(&test_config(), None).unwrap();
        let log = LocalLog::new(state.state_machine.clone(), 16);
        let raw = LogEntry::new(LogOp::Upsert, "a", b"1").encode().unwrap();

        let err = log.submit(raw, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CacheError::Consensus(_)));
    }

    // ============================================================
    // WRITE GATE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_leader_write_then_local_read_needs_no_network() {
        let peers = Arc::new(InProcessPeers::default());
        let leader = spawn_node("10.0.0.1:7000", &peers, true).await;

        assert!(leader.coord.do_set(LogOp::Upsert, "a", b"1").await);
        assert_eq!(
            leader.coord.do_get("a", None).await,
            Some(Bytes::from_static(b"1"))
        );
        assert_eq!(peers.fetches(), 0);
    }

    #[tokio::test]
    async fn test_follower_rejects_writes() {
        let peers = Arc::new(InProcessPeers::default());
        let follower = spawn_node("10.0.0.2:7000", &peers, false).await;

        assert_eq!(follower.coord.role(), NodeRole::Follower);
        assert!(!follower.coord.do_set(LogOp::Upsert, "a", b"1").await);
        assert!(matches!(
            follower.coord.try_set(LogOp::Upsert, "a", b"1").await,
            Err(CacheError::WriteRejected(_))
        ));
        assert!(follower.coord.cache().is_empty());
    }

    #[tokio::test]
    async fn test_empty_key_or_value_rejected() {
        let peers = Arc::new(InProcessPeers::default());
        let leader = spawn_node("10.0.0.1:7000", &peers, true).await;

        assert!(!leader.coord.do_set(LogOp::Upsert, "", b"1").await);
        assert!(!leader.coord.do_set(LogOp::Upsert, "a", b"").await);
        assert!(leader.coord.cache().is_empty());

        assert!(leader.coord.do_set(LogOp::Upsert, "a", b"1").await);
        assert!(matches!(
            leader.coord.try_set(LogOp::Remove, "a", b"").await,
            Err(CacheError::WriteRejected(_))
        ));
        assert_eq!(leader.coord.cache().peek("a"), Some(Bytes::from_static(b"1")));
        assert_eq!(leader.log.status().await.applied_index, 1);
    }

    #[tokio::test]
    async fn test_remove_goes_through_log() {
        let peers = Arc::new(InProcessPeers::default());
        let leader = spawn_node("10.0.0.1:7000", &peers, true).await;

        assert!(leader.coord.do_set(LogOp::Upsert, "a", b"1").await);
        assert!(leader.coord.do_set(LogOp::Remove, "a", b"1").await);
        assert!(leader.coord.do_get("a", None).await.is_none());
        assert_eq!(leader.log.status().await.applied_index, 2);
    }

    #[tokio::test]
    async fn test_consensus_timeout_fails_write() {
        let config = test_config();
        let state = LocalState::new(&config, None).unwrap();
        let (leader_tx, _) = watch::channel(false);
        let log = Arc::new(StalledLog { leader: leader_tx });
        let coord = ReplicationCoordinator::new(
            NodeId::from("10.0.0.1:7000"),
            config,
            state,
            log,
            Arc::new(InProcessPeers::default()),
            Arc::new(MemoryStore::new()),
        );
        coord.set_write_enabled(true);

        let err = coord.try_set(LogOp::Upsert, "a", b"1").await.unwrap_err();
        assert_eq!(err, CacheError::ConsensusTimeout(Duration::from_millis(200)));
        assert!(!coord.do_set(LogOp::Upsert, "a", b"1").await);
        assert!(coord.cache().is_empty());
    }

    #[tokio::test]
    async fn test_do_join_registers_voter() {
        let peers = Arc::new(InProcessPeers::default());
        let leader = spawn_node("10.0.0.1:7000", &peers, true).await;
        let follower = spawn_node("10.0.0.2:7000", &peers, false).await;

        assert!(leader.coord.do_join(follower.coord.local_id()).await);
        assert_eq!(leader.log.voters(), vec![NodeId::from("10.0.0.2:7000")]);
        assert!(!follower.coord.do_join(leader.coord.local_id()).await);
    }

    // ============================================================
    // LEADERSHIP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_leadership_changes_drive_write_gate_and_write_back() {
        let peers = Arc::new(InProcessPeers::default());
        let node = spawn_node("10.0.0.1:7000", &peers, false).await;
        let watcher = node.coord.watch_leadership();

        node.log.bootstrap().await.unwrap();
        let coord = node.coord.clone();
        wait_for(move || coord.role() == NodeRole::Leader).await;
        assert!(node.coord.do_set(LogOp::Upsert, "k", b"v").await);
        assert!(node.store.get("k").is_none());

        node.log.step_down();
        let coord = node.coord.clone();
        wait_for(move || coord.role() == NodeRole::Follower).await;
        let store = node.store.clone();
        wait_for(move || store.get("k").is_some()).await;
        assert!(!node.coord.do_set(LogOp::Upsert, "k", b"w").await);

        watcher.abort();
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_writes() {
        let peers = Arc::new(InProcessPeers::default());
        let node = spawn_node("10.0.0.1:7000", &peers, true).await;

        assert!(node.coord.do_set(LogOp::Upsert, "a", b"1").await);
        assert!(node.coord.do_set(LogOp::Upsert, "b", b"2").await);
        node.coord.shutdown().await;

        assert_eq!(node.store.get("a"), Some(Bytes::from_static(b"1")));
        assert_eq!(node.store.get("b"), Some(Bytes::from_static(b"2")));
        assert!(!node.coord.is_write_enabled());
    }

    // ============================================================
    // READ ROUTING TESTS
    // ============================================================

    #[tokio::test]
    async fn test_follower_reads_through_ring_owner() {
        let peers = Arc::new(InProcessPeers::default());
        let leader = spawn_node("10.0.0.1:7000", &peers, true).await;
        let follower = spawn_node("10.0.0.2:7000", &peers, false).await;
        follower.coord.add_peer(leader.coord.local_id());

        let key = key_owned_by(&follower.coord, leader.coord.local_id());
        assert!(leader.coord.do_set(LogOp::Upsert, &key, b"1").await);

        assert_eq!(
            follower.coord.do_get(&key, None).await,
            Some(Bytes::from_static(b"1"))
        );
        assert_eq!(peers.fetches(), 1);
        assert!(follower.coord.cache().peek(&key).is_none());
    }

    #[tokio::test]
    async fn test_locally_owned_miss_is_authoritative() {
        let peers = Arc::new(InProcessPeers::default());
        let leader = spawn_node("10.0.0.1:7000", &peers, true).await;
        let follower = spawn_node("10.0.0.2:7000", &peers, false).await;
        follower.coord.add_peer(leader.coord.local_id());

        let key = key_owned_by(&follower.coord, follower.coord.local_id());
        assert!(leader.coord.do_set(LogOp::Upsert, &key, b"1").await);

        assert!(follower.coord.do_get(&key, None).await.is_none());
        assert_eq!(peers.fetches(), 0);
    }

    #[tokio::test]
    async fn test_routing_hint_takes_precedence() {
        let peers = Arc::new(InProcessPeers::default());
        let leader = spawn_node("10.0.0.1:7000", &peers, true).await;
        let follower = spawn_node("10.0.0.2:7000", &peers, false).await;
        follower.coord.set_master(Some(leader.coord.local_id().clone()));

        // Follower's ring holds only itself, so without the hint this is a miss.
        assert!(leader.coord.do_set(LogOp::Upsert, "a", b"1").await);
        let master = follower.coord.master();
        assert_eq!(
            follower.coord.do_get("a", master.as_ref()).await,
            Some(Bytes::from_static(b"1"))
        );
        assert!(follower.coord.do_get("a", None).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_owner_reads_as_miss() {
        let peers = Arc::new(InProcessPeers::default());
        let follower = spawn_node("10.0.0.2:7000", &peers, false).await;
        let ghost = NodeId::from("10.0.0.9:7000");
        follower.coord.add_peer(&ghost);

        let key = key_owned_by(&follower.coord, &ghost);
        assert!(follower.coord.do_get(&key, None).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_misses_collapse_to_one_fetch() {
        let peers = Arc::new(InProcessPeers::with_delay(Duration::from_millis(100)));
        let leader = spawn_node("10.0.0.1:7000", &peers, true).await;
        let follower = spawn_node("10.0.0.2:7000", &peers, false).await;
        follower.coord.add_peer(leader.coord.local_id());

        let key = key_owned_by(&follower.coord, leader.coord.local_id());
        assert!(leader.coord.do_set(LogOp::Upsert, &key, b"hot").await);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coord = follower.coord.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move { coord.do_get(&key, None).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(Bytes::from_static(b"hot")));
        }
        assert_eq!(peers.fetches(), 1);
        assert_eq!(follower.coord.in_flight_fetches(), 0);

        follower.coord.do_get(&key, None).await;
        assert_eq!(peers.fetches(), 2);
    }

    // ============================================================
    // TOPOLOGY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_join_migrates_reassigned_keys() {
        let peers = Arc::new(InProcessPeers::default());
        let a = spawn_node("10.0.0.1:7000", &peers, true).await;
        let b = spawn_node("10.0.0.2:7000", &peers, true).await;

        let keys: Vec<String> = (0..60).map(|i| format!("item{}", i)).collect();
        for key in &keys {
            assert!(a.coord.do_set(LogOp::Upsert, key, key.as_bytes()).await);
        }

        let report = a.coord.share_ring(b.coord.local_id()).await.unwrap();
        assert!(report.ranges > 0);
        assert_eq!(report.announced, 1);
        assert_eq!(a.coord.ring_snapshot(), b.coord.ring_snapshot());

        let mut moved = 0;
        for key in &keys {
            let owner = b.coord.owner_of(key).unwrap();
            if &owner == b.coord.local_id() {
                moved += 1;
                assert_eq!(b.coord.cache().peek(key), Some(Bytes::from(key.clone())));
                assert!(a.coord.cache().peek(key).is_none());
            } else {
                assert!(a.coord.cache().peek(key).is_some());
                assert!(b.coord.cache().peek(key).is_none());
            }
        }
        assert_eq!(report.migrated, moved);
    }

    #[tokio::test]
    async fn test_follower_refuses_ring_and_keeps_source_data() {
        let peers = Arc::new(InProcessPeers::default());
        let a = spawn_node("10.0.0.1:7000", &peers, true).await;
        let b = spawn_node("10.0.0.2:7000", &peers, false).await;

        let keys: Vec<String> = (0..60).map(|i| format!("item{}", i)).collect();
        for key in &keys {
            assert!(a.coord.do_set(LogOp::Upsert, key, key.as_bytes()).await);
        }

        let err = a.coord.share_ring(b.coord.local_id()).await.unwrap_err();
        assert!(matches!(err, CacheError::WriteRejected(_)));

        for key in &keys {
            assert_eq!(a.coord.cache().peek(key), Some(Bytes::from(key.clone())));
        }
        assert_eq!(b.coord.ring_peers(), vec![b.coord.local_id().clone()]);
        assert_eq!(a.coord.ring_peers(), vec![a.coord.local_id().clone()]);
    }

    #[tokio::test]
    async fn test_migrate_pulls_nothing_without_log_leadership() {
        let peers = Arc::new(InProcessPeers::default());
        let a = spawn_node("10.0.0.1:7000", &peers, true).await;
        let b = spawn_node("10.0.0.2:7000", &peers, false).await;
        assert!(a.coord.do_set(LogOp::Upsert, "k", b"v").await);

        let everything = MigrationRange {
            start: 0,
            end: u32::MAX,
            source: Some(a.coord.local_id().clone()),
        };
        assert_eq!(b.coord.migrate(&[everything]).await, 0);
        assert_eq!(a.coord.cache().peek("k"), Some(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn test_join_of_empty_ring_adopts_everything() {
        let peers = Arc::new(InProcessPeers::default());
        let node = spawn_node("10.0.0.1:7000", &peers, true).await;

        let report = node.coord.join_ring(PartitionRing::new(3)).await.unwrap();
        assert_eq!(
            report,
            RingSyncReport {
                ranges: 1,
                migrated: 0,
                announced: 0
            }
        );
        assert_eq!(node.coord.ring_peers(), vec![node.coord.local_id().clone()]);
    }

    #[tokio::test]
    async fn test_unreachable_source_is_skipped() {
        let peers = Arc::new(InProcessPeers::default());
        let node = spawn_node("10.0.0.1:7000", &peers, true).await;
        let mut ring = PartitionRing::new(3);
        ring.add_node(&NodeId::from("10.0.0.9:7000"));

        let report = node.coord.join_ring(ring).await.unwrap();
        assert!(report.ranges > 0);
        assert_eq!(report.migrated, 0);
        assert_eq!(report.announced, 0);
        assert_eq!(node.coord.ring_peers().len(), 2);
    }

    #[tokio::test]
    async fn test_set_is_forwarded_to_owner() {
        let peers = Arc::new(InProcessPeers::default());
        let a = spawn_node("10.0.0.1:7000", &peers, true).await;
        let b = spawn_node("10.0.0.2:7000", &peers, true).await;
        a.coord.share_ring(b.coord.local_id()).await.unwrap();

        let key = key_owned_by(&a.coord, b.coord.local_id());
        a.coord
            .route_set(SetRequest {
                op: 1,
                key: key.clone(),
                value: "v".into(),
                forwarded: false,
            })
            .await
            .unwrap();

        assert_eq!(b.coord.cache().peek(&key), Some(Bytes::from_static(b"v")));
        assert!(a.coord.cache().peek(&key).is_none());
    }

    #[tokio::test]
    async fn test_route_set_rejects_unknown_opcode() {
        let peers = Arc::new(InProcessPeers::default());
        let node = spawn_node("10.0.0.1:7000", &peers, true).await;

        let err = node
            .coord
            .route_set(SetRequest {
                op: 42,
                key: "a".into(),
                value: "1".into(),
                forwarded: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::WriteRejected(_)));
    }

    #[tokio::test]
    async fn test_extract_range_drains_matching_hashes() {
        let peers = Arc::new(InProcessPeers::default());
        let node = spawn_node("10.0.0.1:7000", &peers, true).await;
        for i in 0..40 {
            let key = format!("r{}", i);
            assert!(node.coord.do_set(LogOp::Upsert, &key, b"x").await);
        }

        let extracted = node.coord.extract_range(0, u32::MAX / 2);
        for key in extracted.keys() {
            assert!(hash_key(key) <= u32::MAX / 2);
        }
        for key in node.coord.cache().snapshot_all().keys() {
            assert!(hash_key(key) > u32::MAX / 2);
        }
        assert_eq!(extracted.len() + node.coord.cache().len(), 40);
    }

    // ============================================================
    // REGISTRY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_coordinator_registers_default_cache() {
        let peers = Arc::new(InProcessPeers::default());
        let node = spawn_node("10.0.0.1:7000", &peers, true).await;
        let registry = node.coord.registry();

        assert!(registry.has_cache(DEFAULT_CACHE));
        let cache = registry.get(DEFAULT_CACHE).unwrap();
        assert!(Arc::ptr_eq(&cache, node.coord.cache()));
    }

    #[test]
    fn test_registry_register_and_replace() {
        let registry = CacheRegistry::new();
        let first = Arc::new(EvictionCache::new(2, 0).unwrap());
        let second = Arc::new(EvictionCache::new(3, 0).unwrap());

        assert!(registry.register("sessions", first).is_none());
        assert!(registry.register("sessions", second).is_some());
        registry.register("pages", Arc::new(EvictionCache::new(2, 0).unwrap()));

        assert_eq!(registry.list_caches(), vec!["pages", "sessions"]);
        assert_eq!(registry.get("sessions").unwrap().promote_after(), 3);
        assert!(registry.unregister("pages").is_some());
        assert_eq!(registry.cache_count(), 1);
    }
}
