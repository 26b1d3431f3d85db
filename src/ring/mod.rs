//! Partition Ring Module
//!
//! Consistent hashing over a 32-bit circular keyspace.
//!
//! ## Core Concepts
//! - **Virtual points**: Every real node is placed R times at `hash(i ++ node)`.
//!   More points smooth the share of the keyspace each node owns.
//! - **Ownership**: A key belongs to the first point at or after its hash,
//!   wrapping to the lowest point past the top of the ring.
//! - **Migration**: When a node joins, each of its points takes over the
//!   half-open interval `(predecessor, point]` on the ring as it was before the
//!   join. The merged intervals and their previous owners drive data transfer.
//!
//! Hashing uses xxh3, truncated to 32 bits, so every node agrees on placement
//! regardless of process or platform.

pub mod hash_ring;
pub mod types;

pub use hash_ring::{PartitionRing, hash_key};
pub use types::{MigrationRange, NodeId, VirtualPoint};
