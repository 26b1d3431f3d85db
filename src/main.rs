use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use distributed_cache::config::CacheConfig;
use distributed_cache::eviction::EvictionSink;
use distributed_cache::replication::handlers::*;
use distributed_cache::replication::protocol::*;
use distributed_cache::replication::{
    ConsensusLog, HttpPeerClient, LocalLog, LocalState, PeerClient, ReplicationCoordinator,
};
use distributed_cache::ring::NodeId;
use distributed_cache::writeback::{DurableStore, FileStore, MemoryStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --http <addr:port> [--bootstrap] [--join <addr:port>] [--seed <addr:port>] [--config <file>] [--data-dir <dir>]",
            args[0]
        );
        eprintln!("Example: {} --http 127.0.0.1:7000 --bootstrap", args[0]);
        eprintln!(
            "Example: {} --http 127.0.0.1:7001 --bootstrap --seed 127.0.0.1:7000",
            args[0]
        );
        eprintln!(
            "Example: {} --http 127.0.0.1:7002 --join 127.0.0.1:7000",
            args[0]
        );

        std::process::exit(1);
    }

    let mut http_addr: Option<SocketAddr> = None;
    let mut join_addr: Option<SocketAddr> = None;
    let mut seed_addr: Option<SocketAddr> = None;
    let mut bootstrap = false;
    let mut config_path: Option<PathBuf> = None;
    let mut data_dir: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--http" if i + 1 < args.len() => {
                http_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--join" if i + 1 < args.len() => {
                join_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--seed" if i + 1 < args.len() => {
                seed_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--config" if i + 1 < args.len() => {
                config_path = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--data-dir" if i + 1 < args.len() => {
                data_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--bootstrap" => {
                bootstrap = true;
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    let http_addr = http_addr.ok_or_else(|| anyhow::anyhow!("--http is required"))?;

    // 1. Configuration:
    let config = match &config_path {
        Some(path) => {
            let raw = tokio::fs::read_to_string(path).await?;
            CacheConfig::from_json(&raw)?
        }
        None => CacheConfig::default(),
    };
    config.validate()?;
    tracing::info!("Starting cache node on {} with {:?}", http_addr, config);

    // 2. Durable store for write-back:
    let store: Arc<dyn DurableStore> = match &data_dir {
        Some(dir) => {
            let file = FileStore::open(dir.join("writeback.jsonl")).await?;
            tracing::info!("Write-back target: {}", file.path().display());
            Arc::new(file)
        }
        None => {
            tracing::info!("Write-back target: in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // 3. Local cache, state machine and consensus log:
    let on_evict: EvictionSink = Arc::new(|key: &str, value: &bytes::Bytes| {
        tracing::debug!("Evicted '{}' ({} bytes)", key, value.len());
    });
    let state = LocalState::new(&config, Some(on_evict))?;
    let log = Arc::new(LocalLog::new(
        state.state_machine.clone(),
        config.snapshot_threshold,
    ));
    let peers: Arc<dyn PeerClient> = Arc::new(
        HttpPeerClient::new(config.peer_fetch_timeout(), config.peer_fetch_attempts)
            .with_range_timeout(config.range_fetch_timeout()),
    );

    let local = NodeId::new(http_addr.to_string());
    let node = ReplicationCoordinator::new(
        local.clone(),
        config,
        state,
        log.clone(),
        peers.clone(),
        store,
    );
    let _leadership = node.watch_leadership();

    if bootstrap {
        log.bootstrap().await?;
        tracing::info!("Bootstrapped as leader");
    } else {
        tracing::info!("Starting as follower");
    }

    // 4. HTTP Router:
    let app = Router::new()
        .route(ENDPOINT_GET, get(handle_get))
        .route(ENDPOINT_GET_INTERNAL, get(handle_get_internal))
        .route(ENDPOINT_SET, post(handle_set))
        .route(ENDPOINT_JOIN, post(handle_join))
        .route(ENDPOINT_RANGE, get(handle_range))
        .route(ENDPOINT_SHARE_PEERS, post(handle_share_peers))
        .route(ENDPOINT_SEND_PEERS, post(handle_send_peers))
        .route(ENDPOINT_ADD_PEER, post(handle_add_peer))
        .route(ENDPOINT_PEERS, get(handle_peers))
        .route(ENDPOINT_STATS, get(handle_stats))
        .layer(Extension(node.clone()));

    let listener = tokio::net::TcpListener::bind(http_addr).await?;

    // 5. Join the ring and the consensus group once our listener is up:
    let seed = seed_addr.map(|addr| NodeId::new(addr.to_string()));
    let leader = join_addr.map(|addr| NodeId::new(addr.to_string()));
    if let Some(leader) = &leader {
        node.set_master(Some(leader.clone()));
    }
    if seed.is_some() && !bootstrap {
        tracing::warn!("--seed without --bootstrap: a follower refuses to take over ring ranges");
    }
    if seed.is_some() || leader.is_some() {
        let peers = peers.clone();
        let local = local.clone();
        tokio::spawn(async move {
            if let Some(seed) = seed {
                match peers.request_ring(&seed, &local).await {
                    Ok(()) => tracing::info!("Received ring from {}", seed),
                    Err(e) => tracing::error!("Failed to receive ring from {}: {}", seed, e),
                }
            }
            if let Some(leader) = leader {
                match peers.request_join(&leader, &local).await {
                    Ok(()) => tracing::info!("Joined consensus group via {}", leader),
                    Err(e) => tracing::error!("Failed to join via {}: {}", leader, e),
                }
            }
        });
    }

    // 6. Spawn stats reporter:
    let stats_node = node.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));

        loop {
            interval.tick().await;
            let cache = stats_node.cache();
            tracing::info!(
                "Node stats: role={:?} entries={} bytes={}/{} in-flight={}",
                stats_node.role(),
                cache.len(),
                cache.used_bytes(),
                cache.max_bytes(),
                stats_node.in_flight_fetches()
            );
            for peer in stats_node.ring_peers() {
                tracing::info!("  - ring peer {}", peer);
            }
        }
    });

    // 7. Start HTTP server:
    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    node.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}
