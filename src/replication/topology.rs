//! Ring membership and join-time migration.
//!
//! Join flow, seen from the joining node X:
//! 1. An existing node pushes its ring to X (`/sharepeers` then `/sendpeers`).
//! 2. X keeps the prior points, adds itself and computes its migration ranges.
//! 3. For every range X pulls the entries from the prior owner (`/range`),
//!    which removes them at the source, and re-submits them through its log.
//! 4. X announces itself to every other peer (`/addpeer`).

use super::coordinator::ReplicationCoordinator;
use super::protocol::RingSyncReport;
use super::types::{LogEntry, LogOp};
use crate::error::{CacheError, Result};
use crate::ring::{MigrationRange, NodeId, PartitionRing};

impl ReplicationCoordinator {
    pub fn ring_snapshot(&self) -> PartitionRing {
        self.ring.read().clone()
    }

    pub fn ring_peers(&self) -> Vec<NodeId> {
        self.ring.read().peers()
    }

    pub fn owner_of(&self, key: &str) -> Option<NodeId> {
        self.ring.read().owner(key).cloned()
    }

    /// Adds a node announced by a peer. Returns false if it was already known.
    pub fn add_peer(&self, node: &NodeId) -> bool {
        let added = self.ring.write().add_node(node);
        if added {
            tracing::info!("Added {} to the ring", node);
        }
        added
    }

    pub fn remove_peer(&self, node: &NodeId) -> bool {
        let removed = self.ring.write().remove_node(node);
        if removed {
            tracing::info!("Removed {} from the ring", node);
        }
        removed
    }

    /// Replaces the local ring with `ring` plus this node, returning the ranges
    /// this node took over.
    pub fn adopt_ring(&self, mut ring: PartitionRing) -> Vec<MigrationRange> {
        let prior = ring.points().to_vec();
        ring.add_node(&self.local);
        let ranges = ring.migration_ranges(&self.local, &prior);
        tracing::info!(
            "Adopted ring with {} peers, taking over {} ranges",
            ring.peers().len(),
            ranges.len()
        );
        *self.ring.write() = ring;
        ranges
    }

    /// Pulls every range from its prior owner and replays the entries through
    /// the log. Failed ranges and entries are logged and skipped. Returns the
    /// number of entries migrated.
    ///
    /// Pulling drains the source, so nothing is pulled unless the local log
    /// is able to commit the entries.
    pub async fn migrate(&self, ranges: &[MigrationRange]) -> usize {
        if !self.log_accepts_entries() {
            tracing::warn!(
                "Not pulling {} ranges: the local log is not accepting entries",
                ranges.len()
            );
            return 0;
        }
        let mut migrated = 0;
        for range in ranges {
            let Some(source) = range.source.as_ref() else {
                continue;
            };
            if source == &self.local {
                continue;
            }

            let entries = match self.peers.fetch_range(source, range).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        "Failed to pull [{}, {}] from {}: {}",
                        range.start,
                        range.end,
                        source,
                        e
                    );
                    continue;
                }
            };
            tracing::info!(
                "Pulled {} entries in [{}, {}] from {}",
                entries.len(),
                range.start,
                range.end,
                source
            );
            for (key, value) in entries {
                match self
                    .submit_entry(&LogEntry::new(LogOp::Upsert, &key, &value))
                    .await
                {
                    Ok(()) => migrated += 1,
                    Err(e) => tracing::error!("Failed to replay migrated key '{}': {}", key, e),
                }
            }
        }
        migrated
    }

    /// Full join: adopt `ring`, migrate, then announce this node to every peer.
    /// Announcement failures are logged and do not fail the join.
    ///
    /// Refused, leaving the local ring untouched, while the local log cannot
    /// commit entries.
    pub async fn join_ring(&self, ring: PartitionRing) -> Result<RingSyncReport> {
        if !self.log_accepts_entries() {
            return Err(CacheError::WriteRejected(format!(
                "{} cannot take over ring ranges while its log is not leader",
                self.local
            )));
        }
        let ranges = self.adopt_ring(ring);
        let migrated = self.migrate(&ranges).await;

        let mut announced = 0;
        for peer in self.ring_peers() {
            if peer == self.local {
                continue;
            }
            match self.peers.announce(&peer, &self.local).await {
                Ok(()) => announced += 1,
                Err(e) => tracing::warn!("Failed to announce join to {}: {}", peer, e),
            }
        }

        Ok(RingSyncReport {
            ranges: ranges.len(),
            migrated,
            announced,
        })
    }

    /// Pushes this node's ring to `dest` so it can join.
    pub async fn share_ring(&self, dest: &NodeId) -> Result<RingSyncReport> {
        let ring = self.ring_snapshot();
        let report = self.peers.push_ring(dest, &ring).await?;
        tracing::info!(
            "Shared ring with {}: {} ranges, {} entries migrated",
            dest,
            report.ranges,
            report.migrated
        );
        Ok(report)
    }
}
