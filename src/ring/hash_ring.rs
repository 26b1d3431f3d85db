use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use xxhash_rust::xxh3::xxh3_64;

use super::types::{MigrationRange, NodeId, VirtualPoint};

/// Position of a key on the ring. Stable across processes.
pub fn hash_key(key: &str) -> u32 {
    xxh3_64(key.as_bytes()) as u32
}

fn point_hash(index: usize, node: &NodeId) -> u32 {
    hash_key(&format!("{}{}", index, node.0))
}

/// Consistent-hash ring with `replicas` virtual points per real node.
///
/// Points are kept sorted by `(hash, node)`; on an exact hash tie the lower
/// node id wins ownership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartitionRing {
    replicas: usize,
    points: Vec<VirtualPoint>,
}

impl PartitionRing {
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas,
            points: Vec::new(),
        }
    }

    /// Places `replicas` points for `node`. Returns false if the node is
    /// already on the ring.
    pub fn add_node(&mut self, node: &NodeId) -> bool {
        if self.contains(node) {
            return false;
        }
        for i in 0..self.replicas {
            self.points.push(VirtualPoint {
                hash: point_hash(i, node),
                node: node.clone(),
            });
        }
        self.sort_points();
        true
    }

    pub fn remove_node(&mut self, node: &NodeId) -> bool {
        let before = self.points.len();
        self.points.retain(|point| &point.node != node);
        before != self.points.len()
    }

    pub fn owner(&self, key: &str) -> Option<&NodeId> {
        self.owner_of_hash(hash_key(key))
    }

    /// First point at or after `hash`, wrapping around. `None` on an empty ring.
    pub fn owner_of_hash(&self, hash: u32) -> Option<&NodeId> {
        if self.points.is_empty() {
            return None;
        }
        let idx = self.points.partition_point(|point| point.hash < hash);
        let idx = if idx == self.points.len() { 0 } else { idx };
        Some(&self.points[idx].node)
    }

    /// Distinct real nodes on the ring, sorted by id.
    pub fn peers(&self) -> Vec<NodeId> {
        self.points
            .iter()
            .map(|point| point.node.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.points.iter().any(|point| &point.node == node)
    }

    pub fn points(&self) -> &[VirtualPoint] {
        &self.points
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Hash intervals `new_node` took over, relative to `prior` (the ring's
    /// points before the node was added).
    ///
    /// Each point of the new node claims `(prior predecessor, point]`. Wrapping
    /// intervals are split at the top of the ring, overlapping ones merged, and
    /// every result is tagged with the prior owner of its upper bound. An empty
    /// prior ring yields one full-keyspace range with no source.
    pub fn migration_ranges(&self, new_node: &NodeId, prior: &[VirtualPoint]) -> Vec<MigrationRange> {
        let own: Vec<u32> = self
            .points
            .iter()
            .filter(|point| &point.node == new_node)
            .map(|point| point.hash)
            .collect();
        if own.is_empty() {
            return Vec::new();
        }

        let mut prior: Vec<&VirtualPoint> = prior
            .iter()
            .filter(|point| &point.node != new_node)
            .collect();
        prior.sort_by(|a, b| a.hash.cmp(&b.hash).then_with(|| a.node.cmp(&b.node)));

        let Some(last) = prior.last() else {
            return vec![MigrationRange {
                start: 0,
                end: u32::MAX,
                source: None,
            }];
        };
        let last_hash = last.hash;

        let mut intervals: Vec<(u32, u32)> = Vec::with_capacity(own.len() * 2);
        for &hash in &own {
            let idx = prior.partition_point(|point| point.hash < hash);
            let predecessor = if idx == 0 { last_hash } else { prior[idx - 1].hash };

            if predecessor < hash {
                intervals.push((predecessor + 1, hash));
            } else {
                // Wraps past the top of the ring.
                if predecessor < u32::MAX {
                    intervals.push((predecessor + 1, u32::MAX));
                }
                intervals.push((0, hash));
            }
        }

        intervals.sort_unstable();
        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(intervals.len());
        for (start, end) in intervals {
            match merged.last_mut() {
                Some(current) if start <= current.1 => current.1 = current.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        merged
            .into_iter()
            .map(|(start, end)| {
                let idx = prior.partition_point(|point| point.hash < end);
                let idx = if idx == prior.len() { 0 } else { idx };
                MigrationRange {
                    start,
                    end,
                    source: Some(prior[idx].node.clone()),
                }
            })
            .collect()
    }

    fn sort_points(&mut self) {
        self.points
            .sort_by(|a, b| a.hash.cmp(&b.hash).then_with(|| a.node.cmp(&b.node)));
    }
}
