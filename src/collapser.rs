//! Request Collapsing
//!
//! Deduplicates concurrent identical operations. The first caller for a key
//! becomes the leader of a "flight" and runs the operation; callers arriving
//! while the flight is open subscribe to a broadcast channel and receive the
//! leader's exact result, success or error.
//!
//! Nothing is cached: once the leader finishes the key is free again and the
//! next caller starts a new flight.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::{CacheError, Result};

/// Only the single completion message ever goes through the channel.
const FLIGHT_CHANNEL_CAPACITY: usize = 1;

type Flights<T> = Arc<DashMap<String, broadcast::Sender<Result<T>>>>;

pub struct RequestCollapser<T> {
    pending: Flights<T>,
}

enum FlightRole<T> {
    Leader(FlightGuard<T>),
    Waiter(broadcast::Receiver<Result<T>>),
}

/// Clears the flight on drop, so a cancelled or panicking leader releases its
/// waiters (they observe a closed channel) instead of stranding them.
struct FlightGuard<T> {
    key: String,
    sender: broadcast::Sender<Result<T>>,
    pending: Flights<T>,
}

impl<T> FlightGuard<T>
where
    T: Clone,
{
    fn complete(self, result: Result<T>) {
        // Removal happens before the send: a late caller either subscribed
        // already (and gets the message) or finds the key vacant.
        self.pending
            .remove_if(&self.key, |_, sender| sender.same_channel(&self.sender));
        let _ = self.sender.send(result);
    }
}

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        self.pending
            .remove_if(&self.key, |_, sender| sender.same_channel(&self.sender));
    }
}

impl<T> RequestCollapser<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Runs `operation` unless a flight for `key` is already open, in which
    /// case this call waits for and returns that flight's result.
    pub async fn run<F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let role = match self.pending.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                let (tx, _rx) = broadcast::channel(FLIGHT_CHANNEL_CAPACITY);
                vacant.insert(tx.clone());
                FlightRole::Leader(FlightGuard {
                    key: key.to_string(),
                    sender: tx,
                    pending: Arc::clone(&self.pending),
                })
            }
            Entry::Occupied(occupied) => FlightRole::Waiter(occupied.get().subscribe()),
        };

        match role {
            FlightRole::Leader(guard) => {
                let result = operation().await;
                guard.complete(result.clone());
                result
            }
            FlightRole::Waiter(mut rx) => match rx.recv().await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("In-flight fetch for '{}' was abandoned", key);
                    Err(CacheError::Network(format!(
                        "in-flight fetch for '{}' was abandoned",
                        key
                    )))
                }
            },
        }
    }

    /// Number of keys with an open flight.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

impl<T> Default for RequestCollapser<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
