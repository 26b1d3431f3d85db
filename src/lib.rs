//! Distributed Partitioned Cache Library
//!
//! This library crate defines the modules that make up a cache node.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`eviction`**: The bounded local store. An LRU-K cache with a candidate
//!   and a resident tier and exact byte accounting.
//! - **`ring`**: Key placement. A consistent-hash ring with virtual points and
//!   the migration ranges a joining node takes over.
//! - **`replication`**: The node façade. Leader-gated writes through a
//!   consensus log, read routing, topology sync and the HTTP handlers.
//! - **`collapser`**: Singleflight for concurrent remote fetches of one key.
//! - **`writeback`**: Periodic flush of dirty keys into a durable store.
//! - **`config`** / **`error`**: Node configuration and the shared error type.

pub mod collapser;
pub mod config;
pub mod error;
pub mod eviction;
pub mod replication;
pub mod ring;
pub mod writeback;
