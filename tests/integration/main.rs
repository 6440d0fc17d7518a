//! Democracy integration test harness.
//!
//! Tests run real nodes on loopback UDP sockets. Each test binds its own
//! OS-assigned ports, so tests can run in parallel.

mod election;
mod transport;

use std::time::Duration;

use anyhow::{Context, Result};

use democracy_core::NodeConfig;
use democracy_services::{NodeHandle, NodeStatus};

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long any single wait in a test may take.
pub const WAIT: Duration = Duration::from_secs(5);

/// Config with fast timers for tests.
pub fn fast_config(id: &str, weight: u64, source: &str) -> NodeConfig {
    NodeConfig::new()
        .expect("node config")
        .with_id(id)
        .with_weight(weight)
        .with_source(source)
        .with_interval(Duration::from_millis(50))
        .with_timeout(Duration::from_millis(200))
        .with_peer_ttl(Duration::from_secs(2))
        .with_max_chunk_size(8)
}

/// Wait until the node's published status satisfies `check`.
pub async fn wait_for_status(
    handle: &NodeHandle,
    check: impl FnMut(&NodeStatus) -> bool,
) -> Result<NodeStatus> {
    let mut status = handle.status();
    let current = tokio::time::timeout(WAIT, status.wait_for(check))
        .await
        .context("timed out waiting for node status")??;
    Ok(current.clone())
}

/// Stop a node and wait for its receive loop to exit.
pub async fn stop(handle: NodeHandle) -> Result<()> {
    handle.shutdown();
    tokio::time::timeout(WAIT, handle.closed())
        .await
        .context("node did not stop")??;
    Ok(())
}
