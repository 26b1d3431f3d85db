use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;

/// Bounded queue of keys awaiting write-back. Duplicates are allowed.
///
/// The receiving half sits behind a mutex so successive schedulers (one per
/// leadership term) can drain the same queue.
#[derive(Clone)]
pub struct DirtyKeyQueue {
    tx: mpsc::Sender<String>,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
}

/// Producer handle given to the state machine.
#[derive(Clone)]
pub struct DirtyKeySender {
    tx: mpsc::Sender<String>,
}

impl DirtyKeyQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn sender(&self) -> DirtyKeySender {
        DirtyKeySender {
            tx: self.tx.clone(),
        }
    }

    /// Takes every key currently queued without waiting for more.
    pub async fn drain(&self) -> Vec<String> {
        let mut rx = self.rx.lock().await;
        let mut keys = Vec::new();
        while let Ok(key) = rx.try_recv() {
            keys.push(key);
        }
        keys
    }
}

impl DirtyKeySender {
    /// Offers `key` for write-back. Returns false if it was dropped.
    pub fn mark(&self, key: &str) -> bool {
        match self.tx.try_send(key.to_string()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Dirty queue full, dropping key '{}'", key);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}
