//! democracyd — weighted leader announcement daemon.

use std::time::Duration;

use anyhow::{Context, Result};

use democracy_core::{DemocracyConfig, NodeConfig};
use democracy_services::Node;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = DemocracyConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = DemocracyConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        DemocracyConfig::default()
    });

    // Optional source address override
    if let Some(source) = std::env::args().nth(1) {
        config.node.source = source;
    }

    let node_config = NodeConfig::try_from(&config).context("invalid node configuration")?;
    tracing::info!(
        id = %node_config.id,
        weight = node_config.weight,
        source = %node_config.source,
        peers = node_config.peers.len(),
        channels = ?node_config.channels,
        "democracyd starting"
    );

    let handle = Node::start(node_config)
        .await
        .context("failed to start node")?;

    // ── Status printer ───────────────────────────────────────────────────────

    let status_printer = {
        let mut status = handle.status();
        tokio::spawn(async move {
            let mut last_role = status.borrow().role;
            while status.changed().await.is_ok() {
                let s = status.borrow_and_update().clone();
                if s.role != last_role {
                    tracing::info!(role = %s.role, leader = ?s.leader, peers = s.peers, "role update");
                    last_role = s.role;
                }
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r.context("failed to listen for ctrl-c")?;
            tracing::info!("shutdown signal received");
        }
        _ = status_printer => tracing::error!("receive loop exited"),
    }

    handle.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(5), handle.closed()).await;
    match result {
        Ok(Ok(())) => tracing::info!("node stopped"),
        Ok(Err(e)) => tracing::error!(error = %e, "node stopped with error"),
        Err(_) => tracing::warn!("node did not stop in time"),
    }

    Ok(())
}
