//! Write-Back Module
//!
//! Moves cache mutations into a durable store off the write path.
//!
//! ## Core Concepts
//! - **Dirty queue**: Every applied mutation offers its key to a bounded
//!   channel. Producers never block; a full queue silently drops the key.
//! - **Drain**: On each tick the scheduler empties the queue, reads the current
//!   value of every key and upserts it. Keys no longer cached are skipped.
//! - **Close**: Stops the ticker after one last drain, so a node stepping down
//!   from leadership flushes what it has.

pub mod queue;
pub mod scheduler;
pub mod store;

pub use queue::{DirtyKeyQueue, DirtyKeySender};
pub use scheduler::{FlushReport, WriteBackScheduler, flush_dirty};
pub use store::{DurableStore, FileStore, MemoryStore};
