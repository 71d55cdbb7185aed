//! # Node Entrypoint
//!
//! Boots one node of the cache: parses argv, wires up the Store, Ring, and
//! Router, then accepts connections until the process is killed.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use hkv_common::NodeConfig;
use hkv_engine::{LruStore, Store};
use hkv_server::metrics::Metrics;
use hkv_server::{Membership, Router};

const DEFAULT_MAX_BYTES: usize = 64 * 1024 * 1024;
const DEFAULT_VIRTUAL_NODES: usize = 128;

/// argv shape: `hkv-server <self_addr> [max_bytes] [virtual_nodes] [peer_addr...]`.
///
/// Full flag parsing is deliberately not provided; a node's address and its
/// peer list are edge concerns, not the part of this program worth
/// generalizing.
fn config_from_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<NodeConfig> {
    let _argv0 = args.next();
    let self_addr = args.next().context("missing required <self_addr> argument")?;

    let max_bytes = match args.next() {
        Some(raw) => raw.parse().context("max_bytes must be a non-negative integer")?,
        None => DEFAULT_MAX_BYTES,
    };
    let virtual_nodes = match args.next() {
        Some(raw) => raw.parse().context("virtual_nodes must be a non-negative integer")?,
        None => DEFAULT_VIRTUAL_NODES,
    };
    let peers: Vec<String> = args.collect();

    Ok(NodeConfig::new(self_addr, max_bytes, virtual_nodes).with_peers(peers))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = config_from_args(env::args())?;
    tracing::info!(
        self_addr = %config.self_addr,
        peers = ?config.peers,
        max_bytes = config.max_bytes,
        virtual_nodes = config.virtual_nodes,
        "starting node"
    );

    let store: Arc<dyn Store> = Arc::new(LruStore::new(config.max_bytes));
    let membership = Arc::new(Membership::new(
        config.self_addr.clone(),
        &config.peers,
        config.virtual_nodes,
    ));
    let router = Arc::new(Router::new(store, membership));
    let metrics = Arc::new(Metrics::new());

    let listener = TcpListener::bind(&config.self_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.self_addr))?;
    tracing::info!(addr = %config.self_addr, "listening");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let router = Arc::clone(&router);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            tracing::debug!(%peer_addr, "connection accepted");
            if let Err(err) = hkv_server::server::handle_connection(stream, router, metrics).await {
                tracing::warn!(%peer_addr, error = %err, "connection ended with an error");
            }
        });
    }
}
