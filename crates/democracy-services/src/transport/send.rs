//! Sending: encode, fragment and transmit. Fire-and-forget, no
//! acknowledgement, no retransmission.

use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use tokio::net::UdpSocket;

use democracy_core::{fragment, generate_short_id, Message, NodeConfig};

use super::TransportError;

/// Clonable send handle. Touches nothing but the socket, so it can be
/// used from any task alongside the receive loop.
///
/// Holds the socket weakly: once the receive loop exits and releases the
/// socket, every send fails with [`TransportError::Closed`].
///
/// Broadcast targets are resolved once, before the receive loop starts, so
/// announcing never waits on name resolution.
#[derive(Clone)]
pub struct Sender {
    socket: Weak<UdpSocket>,
    max_chunk_size: usize,
    targets: Arc<Vec<SocketAddr>>,
}

impl Sender {
    pub(crate) fn new(socket: Weak<UdpSocket>, max_chunk_size: usize, targets: Vec<SocketAddr>) -> Self {
        Self {
            socket,
            max_chunk_size,
            targets: Arc::new(targets),
        }
    }

    /// Destinations [`Sender::broadcast`] fans out to.
    pub fn targets(&self) -> &[SocketAddr] {
        &self.targets
    }

    /// Send `message` to a `host:port` destination. Returns the number of
    /// datagrams written.
    pub async fn send(&self, message: &Message, destination: &str) -> Result<usize, TransportError> {
        let addr = resolve(destination).await?;
        self.send_to(message, addr).await
    }

    pub async fn send_to(&self, message: &Message, addr: SocketAddr) -> Result<usize, TransportError> {
        let socket = self.socket.upgrade().ok_or(TransportError::Closed)?;

        let encoded = message.encode()?;
        let group_id = generate_short_id()?;
        let chunks = fragment(encoded, self.max_chunk_size, &group_id)?;

        for chunk in &chunks {
            let datagram = chunk.encode()?;
            socket
                .send_to(&datagram, addr)
                .await
                .map_err(|source| TransportError::Send { addr, source })?;
            tracing::trace!(
                %addr,
                group_id = %group_id,
                index = chunk.index,
                total = chunk.total,
                bytes = datagram.len(),
                "chunk sent"
            );
        }

        tracing::debug!(
            %addr,
            group_id = %group_id,
            chunks = chunks.len(),
            state = %message.state,
            "message sent"
        );
        Ok(chunks.len())
    }

    /// Send `message` to every target. A failing target is logged and
    /// skipped; the call fails only if no target was reached. Returns the
    /// number of targets reached.
    pub async fn broadcast(&self, message: &Message) -> Result<usize, TransportError> {
        let mut reached = 0;
        let mut last_error = None;

        for &target in self.targets.iter() {
            match self.send_to(message, target).await {
                Ok(_) => reached += 1,
                Err(TransportError::Closed) => return Err(TransportError::Closed),
                Err(e) => {
                    tracing::warn!(target = %target, error = %e, "announcement send failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if reached == 0 => Err(e),
            _ => Ok(reached),
        }
    }
}

/// Resolve the broadcast targets for `config`: every configured peer, or
/// the node's own address when none are configured.
///
/// Unresolvable peers are logged and skipped. Fails only if peers are
/// configured and none of them resolve.
pub(crate) async fn resolve_targets(
    config: &NodeConfig,
    local_addr: SocketAddr,
) -> Result<Vec<SocketAddr>, TransportError> {
    if config.peers.is_empty() {
        return Ok(vec![local_addr]);
    }

    let mut targets = Vec::with_capacity(config.peers.len());
    let mut last_error = None;
    for peer in &config.peers {
        match resolve(peer).await {
            Ok(addr) => targets.push(addr),
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "skipping unresolvable peer");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if targets.is_empty() => Err(e),
        _ => Ok(targets),
    }
}

async fn resolve(destination: &str) -> Result<SocketAddr, TransportError> {
    tokio::net::lookup_host(destination)
        .await
        .map_err(|source| TransportError::Resolve {
            addr: destination.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| TransportError::NoAddress(destination.to_string()))
}
