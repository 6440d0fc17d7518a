//! Datagram transport — the single UDP socket a node uses for both
//! directions.
//!
//! [`Node::start`] binds the socket and spawns the receive loop, which owns
//! all node state. Everything else talks to it through a [`NodeHandle`].

pub mod receive;
pub mod send;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use democracy_core::{FragmentError, IdError, NodeConfig, WireError};

use crate::state::{NodeState, NodeStatus};

pub use send::Sender;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("failed to resolve {addr}: {source}")]
    Resolve { addr: String, source: io::Error },
    #[error("no address found for {0}")]
    NoAddress(String),
    #[error("failed to send to {addr}: {source}")]
    Send { addr: SocketAddr, source: io::Error },
    #[error("receive failed: {0}")]
    Receive(io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Fragment(#[from] FragmentError),
    #[error(transparent)]
    Id(#[from] IdError),
    #[error("socket closed")]
    Closed,
    #[error("receive task panicked: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Requests message-passed into the receive task.
pub(crate) enum Command {
    /// Broadcast an announcement stamped with the node's current role.
    Announce {
        content: String,
        reply: oneshot::Sender<Result<usize, TransportError>>,
    },
}

pub struct Node;

impl Node {
    /// Bind the socket to `config.source` and spawn the receive loop.
    ///
    /// Bind failures, and configured peers none of which resolve, come back
    /// as errors; nothing here exits the process.
    pub async fn start(config: NodeConfig) -> Result<NodeHandle, TransportError> {
        let socket = UdpSocket::bind(&config.source)
            .await
            .map_err(|source| TransportError::Bind {
                addr: config.source.clone(),
                source,
            })?;
        let local_addr = socket.local_addr().map_err(|source| TransportError::Bind {
            addr: config.source.clone(),
            source,
        })?;
        tracing::info!(%local_addr, id = %config.id, "datagram socket bound");

        let targets = send::resolve_targets(&config, local_addr).await?;

        let socket = Arc::new(socket);
        let config = Arc::new(config);
        let sender = Sender::new(Arc::downgrade(&socket), config.max_chunk_size, targets);

        let state = NodeState::new(config.clone(), local_addr, Instant::now());
        let (status_tx, status_rx) = watch::channel(state.status());
        let (command_tx, command_rx) = mpsc::channel(64);
        let (shutdown_tx, _) = broadcast::channel(1);

        let task = tokio::spawn(receive::receive_loop(
            socket,
            state,
            sender.clone(),
            command_rx,
            shutdown_tx.subscribe(),
            status_tx,
        ));

        Ok(NodeHandle {
            id: config.id.clone(),
            local_addr,
            sender,
            commands: command_tx,
            shutdown: shutdown_tx,
            status: status_rx,
            task,
        })
    }
}

/// Handle to a running node.
pub struct NodeHandle {
    id: String,
    local_addr: SocketAddr,
    sender: Sender,
    commands: mpsc::Sender<Command>,
    shutdown: broadcast::Sender<()>,
    status: watch::Receiver<NodeStatus>,
    task: JoinHandle<Result<(), TransportError>>,
}

impl NodeHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Direct send path, usable from any task.
    pub fn sender(&self) -> Sender {
        self.sender.clone()
    }

    /// Broadcast an application event as an announcement carrying the
    /// node's current role. Returns the number of targets reached.
    pub async fn announce(&self, content: impl Into<String>) -> Result<usize, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Announce {
                content: content.into(),
                reply,
            })
            .await
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)?
    }

    /// Latest node status, updated by the receive loop.
    pub fn status(&self) -> watch::Receiver<NodeStatus> {
        self.status.clone()
    }

    /// Ask the receive loop to stop. The socket is released when it does.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Wait for the receive loop to finish and return how it ended.
    pub async fn closed(self) -> Result<(), TransportError> {
        self.task.await?
    }
}
