use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a cache node. Nodes are addressed by their HTTP address, so the
/// id doubles as the peer endpoint (`host:port`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(addr: &str) -> Self {
        Self(addr.to_string())
    }
}

/// One of the R positions a real node occupies on the ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VirtualPoint {
    pub hash: u32,
    pub node: NodeId,
}

/// Inclusive hash interval `[start, end]` reassigned to a joining node.
///
/// `source` is the node that owned the interval before the join, or `None`
/// when the joiner adopted an empty ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationRange {
    pub start: u32,
    pub end: u32,
    pub source: Option<NodeId>,
}

impl MigrationRange {
    pub fn contains(&self, hash: u32) -> bool {
        self.start <= hash && hash <= self.end
    }
}
