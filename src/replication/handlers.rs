use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
};
use bytes::Bytes;
use std::sync::Arc;

use super::coordinator::ReplicationCoordinator;
use super::protocol::{
    AckResponse, CacheStats, KeyParams, PeerParams, PeersResponse, RangeParams, RangeResponse,
    RingSyncReport, SetRequest, ShareParams, StatsResponse,
};
use super::types::NodeRole;
use crate::error::CacheError;
use crate::ring::{NodeId, PartitionRing};

fn ack(status: StatusCode, success: bool) -> (StatusCode, Json<AckResponse>) {
    (status, Json(AckResponse { success }))
}

fn status_for(err: &CacheError) -> StatusCode {
    match err {
        CacheError::WriteRejected(_) => StatusCode::BAD_REQUEST,
        CacheError::ConsensusTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        CacheError::Network(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn handle_get(
    Extension(node): Extension<Arc<ReplicationCoordinator>>,
    Query(params): Query<KeyParams>,
) -> (StatusCode, Bytes) {
    let master = node.master();
    match node.do_get(&params.key, master.as_ref()).await {
        Some(value) => (StatusCode::OK, value),
        None => (StatusCode::NOT_FOUND, Bytes::new()),
    }
}

pub async fn handle_get_internal(
    Extension(node): Extension<Arc<ReplicationCoordinator>>,
    Query(params): Query<KeyParams>,
) -> (StatusCode, Bytes) {
    match node.get_local(&params.key) {
        Some(value) => (StatusCode::OK, value),
        None => (StatusCode::NOT_FOUND, Bytes::new()),
    }
}

pub async fn handle_set(
    Extension(node): Extension<Arc<ReplicationCoordinator>>,
    Json(req): Json<SetRequest>,
) -> (StatusCode, Json<AckResponse>) {
    let key = req.key.clone();
    match node.route_set(req).await {
        Ok(()) => ack(StatusCode::OK, true),
        Err(e) => {
            tracing::error!("Failed to set '{}': {}", key, e);
            ack(status_for(&e), false)
        }
    }
}

pub async fn handle_join(
    Extension(node): Extension<Arc<ReplicationCoordinator>>,
    Query(params): Query<PeerParams>,
) -> (StatusCode, Json<AckResponse>) {
    if node.do_join(&NodeId::new(params.peer_address)).await {
        ack(StatusCode::OK, true)
    } else {
        ack(StatusCode::SERVICE_UNAVAILABLE, false)
    }
}

pub async fn handle_range(
    Extension(node): Extension<Arc<ReplicationCoordinator>>,
    Query(params): Query<RangeParams>,
) -> (StatusCode, Json<RangeResponse>) {
    if params.start > params.end {
        tracing::error!("Invalid range [{}, {}]", params.start, params.end);
        return (StatusCode::BAD_REQUEST, Json(RangeResponse::default()));
    }

    let entries = node
        .extract_range(params.start, params.end)
        .into_iter()
        .map(|(key, value)| (key, value.to_vec()))
        .collect();
    (StatusCode::OK, Json(RangeResponse { entries }))
}

pub async fn handle_share_peers(
    Extension(node): Extension<Arc<ReplicationCoordinator>>,
    Query(params): Query<ShareParams>,
) -> (StatusCode, Json<AckResponse>) {
    match node.share_ring(&NodeId::new(params.dest)).await {
        Ok(_) => ack(StatusCode::OK, true),
        Err(e) => {
            tracing::error!("Failed to share ring: {}", e);
            ack(status_for(&e), false)
        }
    }
}

pub async fn handle_send_peers(
    Extension(node): Extension<Arc<ReplicationCoordinator>>,
    Json(ring): Json<PartitionRing>,
) -> (StatusCode, Json<RingSyncReport>) {
    match node.join_ring(ring).await {
        Ok(report) => (StatusCode::OK, Json(report)),
        Err(e) => {
            tracing::error!("Failed to join pushed ring: {}", e);
            (status_for(&e), Json(RingSyncReport::default()))
        }
    }
}

pub async fn handle_add_peer(
    Extension(node): Extension<Arc<ReplicationCoordinator>>,
    Query(params): Query<PeerParams>,
) -> (StatusCode, Json<AckResponse>) {
    node.add_peer(&NodeId::new(params.peer_address));
    ack(StatusCode::OK, true)
}

pub async fn handle_peers(
    Extension(node): Extension<Arc<ReplicationCoordinator>>,
) -> (StatusCode, Json<PeersResponse>) {
    let peers = node.ring_peers().into_iter().map(|peer| peer.0).collect();
    (StatusCode::OK, Json(PeersResponse { peers }))
}

pub async fn handle_stats(
    Extension(node): Extension<Arc<ReplicationCoordinator>>,
) -> (StatusCode, Json<StatsResponse>) {
    let registry = node.registry();
    let caches = registry
        .list_caches()
        .into_iter()
        .filter_map(|name| {
            registry.get(&name).map(|cache| CacheStats {
                entries: cache.len(),
                used_bytes: cache.used_bytes(),
                max_bytes: cache.max_bytes(),
                name,
            })
        })
        .collect();

    let role = match node.role() {
        NodeRole::Leader => "leader",
        NodeRole::Follower => "follower",
    };

    (
        StatusCode::OK,
        Json(StatsResponse {
            node: node.local_id().to_string(),
            role: role.to_string(),
            write_enabled: node.is_write_enabled(),
            in_flight_fetches: node.in_flight_fetches(),
            peers: node.ring_peers().into_iter().map(|peer| peer.0).collect(),
            caches,
        }),
    )
}
