//! Leader election between real nodes on loopback.
//!
//! Every node binds an OS-assigned port, so only a node started later can
//! name an earlier one as its peer. The later node is the one expected to
//! win, and its announcements reach the earlier one.

use std::time::Duration;

use anyhow::Result;

use democracy_core::Role;
use democracy_services::Node;

use crate::{fast_config, stop, wait_for_status};

#[tokio::test]
async fn lone_node_elects_itself() -> Result<()> {
    let node = Node::start(fast_config("solo", 3, "127.0.0.1:0")).await?;

    let status = wait_for_status(&node, |s| s.role == Role::Leader).await?;
    assert_eq!(status.leader.as_deref(), Some("solo"));

    stop(node).await
}

#[tokio::test]
async fn heavier_node_takes_over() -> Result<()> {
    let light = Node::start(fast_config("light", 10, "127.0.0.1:0")).await?;
    wait_for_status(&light, |s| s.role == Role::Leader).await?;

    let heavy = Node::start(
        fast_config("heavy", 20, "127.0.0.1:0").with_peers([light.local_addr().to_string()]),
    )
    .await?;

    wait_for_status(&heavy, |s| s.role == Role::Leader).await?;
    let status = wait_for_status(&light, |s| {
        s.role == Role::Follower && s.leader.as_deref() == Some("heavy")
    })
    .await?;
    assert_eq!(status.peers, 1);

    stop(light).await?;
    stop(heavy).await
}

#[tokio::test]
async fn equal_weights_break_tie_on_smaller_id() -> Result<()> {
    let beta = Node::start(fast_config("beta", 7, "127.0.0.1:0")).await?;
    let alpha = Node::start(
        fast_config("alpha", 7, "127.0.0.1:0").with_peers([beta.local_addr().to_string()]),
    )
    .await?;

    wait_for_status(&alpha, |s| s.role == Role::Leader).await?;
    wait_for_status(&beta, |s| s.role == Role::Follower && s.leader.as_deref() == Some("alpha"))
        .await?;

    stop(alpha).await?;
    stop(beta).await
}

#[tokio::test]
async fn follower_takes_over_when_leader_stops() -> Result<()> {
    let standby = Node::start(
        fast_config("standby", 1, "127.0.0.1:0").with_peer_ttl(Duration::from_millis(400)),
    )
    .await?;
    let primary = Node::start(
        fast_config("primary", 50, "127.0.0.1:0").with_peers([standby.local_addr().to_string()]),
    )
    .await?;

    wait_for_status(&standby, |s| s.leader.as_deref() == Some("primary")).await?;
    stop(primary).await?;

    let status = wait_for_status(&standby, |s| s.role == Role::Leader).await?;
    assert_eq!(status.leader.as_deref(), Some("standby"));
    assert_eq!(status.peers, 0);

    stop(standby).await
}
