use std::io;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::state::{NodeState, NodeStatus};

use super::{Command, Sender, TransportError};

/// Log reassembly counters every this many poll intervals.
const STATS_EVERY: u64 = 10;

/// Receive loop. Sole owner of the node state and of the only strong
/// reference to the socket. Returning drops both.
pub(crate) async fn receive_loop(
    socket: Arc<UdpSocket>,
    mut state: NodeState,
    sender: Sender,
    mut commands: mpsc::Receiver<Command>,
    mut shutdown: broadcast::Receiver<()>,
    status: watch::Sender<NodeStatus>,
) -> Result<(), TransportError> {
    let mut buf = vec![0u8; state.config().recv_buffer_size];
    let mut interval = tokio::time::interval(state.config().interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    tracing::info!(
        id = %state.config().id,
        weight = state.config().weight,
        targets = ?sender.targets(),
        "receive loop starting"
    );

    let result = loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("receive loop shutting down");
                break Ok(());
            }

            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((len, from)) => {
                        state.handle_datagram(&buf[..len], from, Instant::now());
                    }
                    Err(e) if is_transient(&e) => {
                        tracing::debug!(error = %e, "transient receive error");
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "recv_from failed");
                        break Err(TransportError::Receive(e));
                    }
                }
            }

            _ = interval.tick() => {
                ticks += 1;
                if let Some(announcement) = state.on_interval(Instant::now()) {
                    if let Err(e) = sender.broadcast(&announcement).await {
                        tracing::warn!(error = %e, "periodic announcement failed");
                    }
                }
                if ticks % STATS_EVERY == 0 {
                    let s = state.status();
                    tracing::info!(
                        role = %s.role,
                        leader = ?s.leader,
                        peers = s.peers,
                        in_flight = s.in_flight,
                        completed = s.reassembly.completed,
                        duplicates = s.reassembly.duplicates,
                        rejected = s.reassembly.rejected,
                        evicted = s.reassembly.evicted,
                        "node stats"
                    );
                }
            }

            Some(command) = commands.recv() => {
                match command {
                    Command::Announce { content, reply } => {
                        let announcement = state.announcement(content, Instant::now());
                        let result = sender.broadcast(&announcement).await;
                        let _ = reply.send(result);
                    }
                }
            }
        }

        status.send_if_modified(|current| {
            let next = state.status();
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    };

    tracing::info!(id = %state.config().id, "receive loop stopped, socket released");
    result
}

/// Errors a datagram socket can report for an earlier send (ICMP port
/// unreachable) without being broken itself.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}
