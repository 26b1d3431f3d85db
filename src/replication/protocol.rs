//! Cache Node Network Protocol
//!
//! API endpoints and Data Transfer Objects (DTOs) for client traffic and
//! node-to-node calls (remote reads, forwarded writes, ring sync, migration).
//!
//! Parameters travel in the query string except for bodies that carry
//! structure (writes and whole rings), which are JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- API Endpoints ---

/// Public read. Routes misses to the master or the ring owner.
pub const ENDPOINT_GET: &str = "/get";
/// Peer read served from the local cache only, never routed further.
pub const ENDPOINT_GET_INTERNAL: &str = "/internal/get";
/// Public write. Forwarded to the ring owner when it is another node.
pub const ENDPOINT_SET: &str = "/set";
/// Asks this node's log to add a voter.
pub const ENDPOINT_JOIN: &str = "/join";
/// Drains a hash interval out of this node (migration source side).
pub const ENDPOINT_RANGE: &str = "/range";
/// Asks this node to push its ring to `dest`.
pub const ENDPOINT_SHARE_PEERS: &str = "/sharepeers";
/// Receives a ring, joins it and pulls the ranges this node now owns.
pub const ENDPOINT_SEND_PEERS: &str = "/sendpeers";
/// Adds a newly joined node to this node's ring.
pub const ENDPOINT_ADD_PEER: &str = "/addpeer";
/// Lists ring members.
pub const ENDPOINT_PEERS: &str = "/peers";
pub const ENDPOINT_STATS: &str = "/stats";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyParams {
    pub key: String,
}

/// Client or forwarded write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetRequest {
    /// Log opcode: 0 or 1 upsert, 2 remove.
    pub op: u8,
    pub key: String,
    /// UTF-8 value. Must be non-empty, removes included.
    #[serde(default)]
    pub value: String,
    /// Set by the node that forwarded this write, so the receiver applies it
    /// instead of forwarding again when the two rings disagree.
    #[serde(default)]
    pub forwarded: bool,
}

/// Generic acknowledgment.
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeerParams {
    /// Node address (`host:port`).
    pub peer_address: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareParams {
    pub dest: String,
}

/// Inclusive hash interval to extract.
#[derive(Debug, Serialize, Deserialize)]
pub struct RangeParams {
    pub start: u32,
    pub end: u32,
}

/// Entries removed from the source for one migration range.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RangeResponse {
    pub entries: BTreeMap<String, Vec<u8>>,
}

/// Outcome of adopting a pushed ring.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingSyncReport {
    /// Merged ranges this node took over.
    pub ranges: usize,
    /// Entries pulled from sources and re-submitted through the log.
    pub migrated: usize,
    /// Peers that acknowledged the join announcement.
    pub announced: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStats {
    pub name: String,
    pub entries: usize,
    pub used_bytes: u64,
    pub max_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub node: String,
    pub role: String,
    pub write_enabled: bool,
    pub in_flight_fetches: usize,
    pub peers: Vec<String>,
    pub caches: Vec<CacheStats>,
}
