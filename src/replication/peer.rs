//! Outbound Peer Calls
//!
//! Everything a node asks of another node goes through [`PeerClient`]. The
//! HTTP implementation retries connection failures with bounded exponential
//! backoff plus jitter; HTTP error statuses are not retried.
//!
//! Range pulls drain the source, so they are sent exactly once with their own
//! (longer) timeout.

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;

use super::protocol::*;
use crate::error::{CacheError, Result};
use crate::ring::{MigrationRange, NodeId, PartitionRing};

#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Reads `key` from the peer's local cache. `Ok(None)` when absent.
    async fn fetch(&self, peer: &NodeId, key: &str) -> Result<Option<Bytes>>;

    /// Removes and returns the peer's entries whose hash lies in `range`.
    async fn fetch_range(&self, peer: &NodeId, range: &MigrationRange) -> Result<HashMap<String, Bytes>>;

    /// Hands a write to the node that owns its key. Returns the peer's verdict.
    async fn forward_set(&self, peer: &NodeId, request: &SetRequest) -> Result<bool>;

    /// Sends a full ring so the peer can join it.
    async fn push_ring(&self, peer: &NodeId, ring: &PartitionRing) -> Result<RingSyncReport>;

    /// Tells `peer` that `joined` is now on the ring.
    async fn announce(&self, peer: &NodeId, joined: &NodeId) -> Result<()>;

    /// Asks `leader` to add `joiner` to its consensus group.
    async fn request_join(&self, leader: &NodeId, joiner: &NodeId) -> Result<()>;

    /// Asks `source` to push its ring to `dest`.
    async fn request_ring(&self, source: &NodeId, dest: &NodeId) -> Result<()>;
}

pub struct HttpPeerClient {
    http_client: reqwest::Client,
    timeout: Duration,
    range_timeout: Duration,
    attempts: usize,
}

fn network(e: anyhow::Error) -> CacheError {
    CacheError::Network(e.to_string())
}

impl HttpPeerClient {
    pub fn new(timeout: Duration, attempts: usize) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            timeout,
            range_timeout: timeout,
            attempts: attempts.max(1),
        }
    }

    pub fn with_range_timeout(mut self, range_timeout: Duration) -> Self {
        self.range_timeout = range_timeout;
        self
    }

    fn url(peer: &NodeId, endpoint: &str, params: &[(&str, &str)]) -> Result<reqwest::Url> {
        let base = format!("http://{}{}", peer, endpoint);
        let parsed = if params.is_empty() {
            reqwest::Url::parse(&base)
        } else {
            reqwest::Url::parse_with_params(&base, params)
        };
        parsed.map_err(|e| CacheError::Network(format!("bad peer url {}: {}", base, e)))
    }

    async fn post_with_retry<T: serde::Serialize + Sync>(
        &self,
        url: reqwest::Url,
        payload: Option<&T>,
    ) -> anyhow::Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let mut request = self.http_client.post(url.clone()).timeout(self.timeout);
            if let Some(payload) = payload {
                request = request.json(payload);
            }

            match request.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow!("Retry attempts exhausted"))
    }

    async fn get_with_retry(&self, url: reqwest::Url) -> anyhow::Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self
                .http_client
                .get(url.clone())
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow!("Retry attempts exhausted"))
    }

    async fn post_ack(&self, url: reqwest::Url, what: &str) -> Result<()> {
        let response = self
            .post_with_retry::<()>(url, None)
            .await
            .map_err(network)?;
        if !response.status().is_success() {
            return Err(CacheError::Network(format!(
                "{} failed: {}",
                what,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn fetch(&self, peer: &NodeId, key: &str) -> Result<Option<Bytes>> {
        let url = Self::url(peer, ENDPOINT_GET_INTERNAL, &[("key", key)])?;
        let response = self.get_with_retry(url).await.map_err(network)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CacheError::Network(format!(
                "GET {} from {} failed: {}",
                key,
                peer,
                response.status()
            )));
        }
        Ok(Some(response.bytes().await?))
    }

    async fn fetch_range(&self, peer: &NodeId, range: &MigrationRange) -> Result<HashMap<String, Bytes>> {
        let start = range.start.to_string();
        let end = range.end.to_string();
        let url = Self::url(peer, ENDPOINT_RANGE, &[("start", start.as_str()), ("end", end.as_str())])?;
        let response = self
            .http_client
            .get(url)
            .timeout(self.range_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CacheError::Network(format!(
                "range [{}, {}] from {} failed: {}",
                start,
                end,
                peer,
                response.status()
            )));
        }
        let body: RangeResponse = response.json().await?;
        Ok(body
            .entries
            .into_iter()
            .map(|(key, value)| (key, Bytes::from(value)))
            .collect())
    }

    async fn forward_set(&self, peer: &NodeId, request: &SetRequest) -> Result<bool> {
        let url = Self::url(peer, ENDPOINT_SET, &[])?;
        let response = self
            .post_with_retry(url, Some(request))
            .await
            .map_err(network)?;
        let ack: AckResponse = response.json().await?;
        Ok(ack.success)
    }

    async fn push_ring(&self, peer: &NodeId, ring: &PartitionRing) -> Result<RingSyncReport> {
        let url = Self::url(peer, ENDPOINT_SEND_PEERS, &[])?;
        let response = self
            .post_with_retry(url, Some(ring))
            .await
            .map_err(network)?;
        if !response.status().is_success() {
            return Err(CacheError::Network(format!(
                "ring push to {} failed: {}",
                peer,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn announce(&self, peer: &NodeId, joined: &NodeId) -> Result<()> {
        let url = Self::url(peer, ENDPOINT_ADD_PEER, &[("peer_address", joined.as_str())])?;
        self.post_ack(url, "announce").await
    }

    async fn request_join(&self, leader: &NodeId, joiner: &NodeId) -> Result<()> {
        let url = Self::url(leader, ENDPOINT_JOIN, &[("peer_address", joiner.as_str())])?;
        self.post_ack(url, "join").await
    }

    async fn request_ring(&self, source: &NodeId, dest: &NodeId) -> Result<()> {
        let url = Self::url(source, ENDPOINT_SHARE_PEERS, &[("dest", dest.as_str())])?;
        self.post_ack(url, "ring share").await
    }
}
