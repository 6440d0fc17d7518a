//! Datagram path: fragmentation, reassembly and socket lifecycle over
//! real loopback sockets.

use std::time::Duration;

use anyhow::Result;
use tokio::net::UdpSocket;

use democracy_core::{fragment, Chunk, Message, Role};
use democracy_services::{Node, Reassembler, TransportError};

use crate::{fast_config, stop, wait_for_status, WAIT};

fn announcement(id: &str, weight: u64, state: Role, candidate: &str) -> Message {
    Message {
        content: "hi".to_string(),
        candidate: candidate.to_string(),
        state,
        id: id.to_string(),
        weight,
        channels: Vec::new(),
    }
}

/// Receive datagrams on `socket` until a message with `content` completes.
/// Periodic announcements are skipped.
async fn receive_content(socket: &UdpSocket, content: &str) -> Result<Message> {
    let mut reassembler = Reassembler::new(3);
    let mut buf = vec![0u8; 65536];
    loop {
        let (len, _) = tokio::time::timeout(WAIT, socket.recv_from(&mut buf)).await??;
        let chunk = Chunk::decode(&buf[..len])?;
        if let Some(payload) = reassembler.ingest(chunk)? {
            let message = Message::decode(&payload)?;
            if message.content == content {
                return Ok(message);
            }
        }
    }
}

#[tokio::test]
async fn reversed_two_byte_chunks_reach_node() -> Result<()> {
    let raw = UdpSocket::bind("127.0.0.1:0").await?;
    // Peer the node with the raw socket so it never hears its own echo.
    let node = Node::start(
        fast_config("local", 1, "127.0.0.1:0")
            .with_interval(Duration::from_secs(60))
            .with_peers([raw.local_addr()?.to_string()]),
    )
    .await?;
    let sent = announcement("remote", 9, Role::Leader, &raw.local_addr()?.to_string());

    let mut chunks = fragment(sent.encode()?, 2, "a1b2c3d4")?;
    assert!(chunks.len() > 1);
    chunks.reverse();
    for chunk in &chunks {
        raw.send_to(&chunk.encode()?, node.local_addr()).await?;
    }

    let status = wait_for_status(&node, |s| s.peers == 1).await?;
    assert_eq!(status.leader.as_deref(), Some("remote"));
    assert_eq!(status.in_flight, 0);
    assert_eq!(status.reassembly.completed, 1);

    stop(node).await
}

#[tokio::test]
async fn malformed_datagrams_do_not_stop_the_loop() -> Result<()> {
    let raw = UdpSocket::bind("127.0.0.1:0").await?;
    let node = Node::start(
        fast_config("local", 1, "127.0.0.1:0")
            .with_interval(Duration::from_secs(60))
            .with_peers([raw.local_addr()?.to_string()]),
    )
    .await?;

    raw.send_to(b"not json", node.local_addr()).await?;
    raw.send_to(br#"{"chunk":"x","id":"g","total":0,"counter":0}"#, node.local_addr())
        .await?;
    raw.send_to(br#"{"chunk":"{oops","id":"g","total":1,"counter":0}"#, node.local_addr())
        .await?;

    let sent = announcement("remote", 9, Role::Candidate, &raw.local_addr()?.to_string());
    for chunk in fragment(sent.encode()?, 16, "ffff0000")? {
        raw.send_to(&chunk.encode()?, node.local_addr()).await?;
    }

    let status = wait_for_status(&node, |s| s.peers == 1).await?;
    assert_eq!(status.reassembly.completed, 2);

    stop(node).await
}

#[tokio::test]
async fn announce_reaches_configured_peer() -> Result<()> {
    let peer = UdpSocket::bind("127.0.0.1:0").await?;
    let node = Node::start(
        fast_config("speaker", 4, "127.0.0.1:0")
            .with_interval(Duration::from_secs(60))
            .with_peers([peer.local_addr()?.to_string()]),
    )
    .await?;

    let reached = node.announce("deploy").await?;
    assert_eq!(reached, 1);

    let message = receive_content(&peer, "deploy").await?;
    assert_eq!(message.content, "deploy");
    assert_eq!(message.sender_id(), "speaker");
    assert_eq!(message.weight, 4);
    assert_eq!(message.candidate, node.local_addr().to_string());

    stop(node).await
}

#[tokio::test]
async fn shutdown_releases_the_socket() -> Result<()> {
    let node = Node::start(fast_config("local", 1, "127.0.0.1:0")).await?;
    let sender = node.sender();
    let local = node.local_addr();

    stop(node).await?;

    let late = announcement("local", 1, Role::Follower, &local.to_string());
    assert!(matches!(
        sender.send_to(&late, local).await,
        Err(TransportError::Closed)
    ));

    // The address can be bound again.
    let again = Node::start(fast_config("local", 1, &local.to_string())).await?;
    stop(again).await
}

#[tokio::test]
async fn binding_a_taken_address_fails() -> Result<()> {
    let first = Node::start(fast_config("one", 1, "127.0.0.1:0")).await?;
    let taken = first.local_addr().to_string();

    let second = Node::start(fast_config("two", 1, &taken)).await;
    assert!(matches!(second, Err(TransportError::Bind { .. })));

    stop(first).await
}

#[tokio::test]
async fn start_fails_when_no_peer_resolves() {
    let result = Node::start(fast_config("lost", 1, "127.0.0.1:0").with_peers(["no port here"])).await;
    assert!(matches!(result, Err(TransportError::Resolve { .. })));
}

#[tokio::test]
async fn replayed_datagram_is_applied_once() -> Result<()> {
    let raw = UdpSocket::bind("127.0.0.1:0").await?;
    let node = Node::start(
        fast_config("local", 1, "127.0.0.1:0")
            .with_interval(Duration::from_secs(60))
            .with_peers([raw.local_addr()?.to_string()]),
    )
    .await?;

    let sent = announcement("remote", 9, Role::Leader, &raw.local_addr()?.to_string());
    let chunks = fragment(sent.encode()?, 4096, "0badf00d")?;
    assert_eq!(chunks.len(), 1);
    let datagram = chunks[0].encode()?;
    raw.send_to(&datagram, node.local_addr()).await?;
    raw.send_to(&datagram, node.local_addr()).await?;

    let status = wait_for_status(&node, |s| s.reassembly.duplicates == 1).await?;
    assert_eq!(status.reassembly.completed, 1);
    assert_eq!(status.in_flight, 0);
    assert_eq!(status.peers, 1);

    stop(node).await
}

#[tokio::test]
async fn announce_after_shutdown_is_closed() -> Result<()> {
    let node = Node::start(fast_config("local", 1, "127.0.0.1:0")).await?;
    node.shutdown();
    let mut status = node.status();
    // Sender side of the watch drops with the receive loop.
    tokio::time::timeout(WAIT, async { while status.changed().await.is_ok() {} }).await?;

    assert!(matches!(node.announce("late").await, Err(TransportError::Closed)));
    node.closed().await?;
    Ok(())
}
