//! Replication Module
//!
//! Ties the eviction cache, the partition ring and the consensus log into one
//! cache node.
//!
//! ## Core Concepts
//! - **Write gate**: `ReplicationCoordinator` accepts writes only while the
//!   node is leader. A write becomes a `LogEntry`, is submitted to the log with
//!   a timeout and reaches the cache when the engine applies it.
//! - **State machine**: `CacheStateMachine` is the engine's only handle on the
//!   node (Apply / Snapshot / Restore), so engine and coordinator never point
//!   at each other.
//! - **Reads**: Local cache first. A miss is routed to the master hint or the
//!   ring owner through a `RequestCollapser`; remote values are not cached.
//! - **Topology**: Rings are pushed between nodes; a joining node pulls the
//!   hash ranges it took over and replays them through its own log.

pub mod consensus;
pub mod coordinator;
pub mod handlers;
pub mod peer;
pub mod protocol;
pub mod registry;
pub mod state_machine;
pub mod topology;
pub mod types;

pub use consensus::{ConsensusLog, LocalLog, LogStatus};
pub use coordinator::{DEFAULT_CACHE, LocalState, ReplicationCoordinator};
pub use peer::{HttpPeerClient, PeerClient};
pub use registry::CacheRegistry;
pub use state_machine::CacheStateMachine;
pub use types::{LogEntry, LogOp, NodeRole};

#[cfg(test)]
mod tests;
