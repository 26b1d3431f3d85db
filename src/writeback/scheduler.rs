use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::queue::DirtyKeyQueue;
use super::store::DurableStore;
use crate::eviction::EvictionCache;

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Keys upserted into the durable store.
    pub flushed: usize,
    /// Keys no longer in the cache when the drain reached them.
    pub skipped: usize,
    /// Upserts that failed. They are logged and not retried.
    pub failed: usize,
}

/// Drains the queue once and upserts the current value of each distinct key.
pub async fn flush_dirty(
    queue: &DirtyKeyQueue,
    cache: &EvictionCache,
    store: &dyn DurableStore,
) -> FlushReport {
    let keys = queue.drain().await;
    let mut seen = HashSet::with_capacity(keys.len());
    let mut report = FlushReport::default();

    for key in keys {
        if !seen.insert(key.clone()) {
            continue;
        }
        let Some(value) = cache.peek(&key) else {
            report.skipped += 1;
            continue;
        };
        match store.upsert(&key, &value).await {
            Ok(()) => report.flushed += 1,
            Err(e) => {
                tracing::error!("Write-back of '{}' failed: {}", key, e);
                report.failed += 1;
            }
        }
    }
    report
}

/// Periodic drain task. One instance lives for each leadership term.
pub struct WriteBackScheduler {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<FlushReport>>,
}

impl WriteBackScheduler {
    pub fn start(
        queue: DirtyKeyQueue,
        cache: Arc<EvictionCache>,
        store: Arc<dyn DurableStore>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = flush_dirty(&queue, &cache, store.as_ref()).await;
                        if report.flushed > 0 || report.failed > 0 {
                            tracing::debug!(
                                "Write-back tick: {} flushed, {} skipped, {} failed",
                                report.flushed,
                                report.skipped,
                                report.failed
                            );
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }

            let report = flush_dirty(&queue, &cache, store.as_ref()).await;
            tracing::info!(
                "Write-back stopped, final flush wrote {} keys ({} failed)",
                report.flushed,
                report.failed
            );
            report
        });

        tracing::info!("Write-back scheduler started (interval {:?})", interval);
        Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Stops ticking and returns once the final drain has completed.
    pub async fn close(mut self) -> FlushReport {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let Some(handle) = self.handle.take() else {
            return FlushReport::default();
        };
        match handle.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Write-back task ended abnormally: {}", e);
                FlushReport::default()
            }
        }
    }
}

impl Drop for WriteBackScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
