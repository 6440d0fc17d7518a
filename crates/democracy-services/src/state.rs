//! Node state — reassembly buffers, membership view and leadership,
//! owned exclusively by the receive task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use democracy_core::{Chunk, Message, NodeConfig, Role};

use crate::leadership::{Leadership, Transition};
use crate::membership::{MembershipView, NodeIdentity};
use crate::reassembly::{ReassemblyStats, Reassembler};

/// Snapshot published after every event the receive task handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub id: String,
    pub role: Role,
    /// Member currently believed to lead, if any.
    pub leader: Option<String>,
    pub peers: usize,
    /// Incomplete chunk groups buffered.
    pub in_flight: usize,
    pub reassembly: ReassemblyStats,
}

pub struct NodeState {
    config: Arc<NodeConfig>,
    /// Bound socket address, announced as `candidate`.
    candidate: String,
    reassembler: Reassembler,
    membership: MembershipView,
    leadership: Leadership,
}

impl NodeState {
    pub fn new(config: Arc<NodeConfig>, local_addr: SocketAddr, now: Instant) -> Self {
        let candidate = local_addr.to_string();
        let mut local = NodeIdentity::new(config.id.clone(), candidate.clone(), config.weight, now);
        local.channels = config.channels.iter().cloned().collect();

        Self {
            reassembler: Reassembler::new(config.reassembly_windows),
            membership: MembershipView::new(local),
            leadership: Leadership::new(config.id.clone(), config.weight, config.timeout),
            candidate,
            config,
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.leadership.role()
    }

    pub fn membership(&self) -> &MembershipView {
        &self.membership
    }

    /// Decode one datagram, feed it to the reassembler and, if that
    /// completes a group, decode and apply the message.
    ///
    /// Every failure is logged and discarded. Returns the message a
    /// completed group decoded to.
    pub fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr, now: Instant) -> Option<Message> {
        let chunk = match Chunk::decode(datagram) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(peer = %from, error = %e, "discarding malformed chunk");
                return None;
            }
        };

        tracing::trace!(
            peer = %from,
            group_id = %chunk.group_id,
            index = chunk.index,
            total = chunk.total,
            "chunk received"
        );

        let payload = match self.reassembler.ingest(chunk) {
            Ok(Some(p)) => p,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(peer = %from, error = %e, "discarding inconsistent chunk");
                return None;
            }
        };

        let message = match Message::decode(&payload) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(
                    peer = %from,
                    payload_len = payload.len(),
                    error = %e,
                    "discarding undecodable message"
                );
                return None;
            }
        };

        tracing::debug!(
            peer = %from,
            sender = message.sender_id(),
            state = %message.state,
            content = %message.content,
            "message reassembled"
        );
        self.handle_message(&message, now);
        Some(message)
    }

    /// Apply an announcement: refresh the sender's entry, then let the
    /// leadership rule react to it.
    pub fn handle_message(&mut self, message: &Message, now: Instant) {
        let (id, weight) = match self.membership.observe(message, now) {
            Some(peer) => (peer.id.clone(), peer.weight),
            None => {
                tracing::trace!("ignoring own announcement");
                return;
            }
        };

        if let Some(t) = self.leadership.observe(&id, weight) {
            tracing::info!(peer = %id, weight, "outranked by peer");
            self.apply(t, now);
        }
    }

    /// Periodic work for one poll interval: expire stale groups and
    /// peers, run the leadership timers, and return the announcement to
    /// broadcast if this node is a candidate or leader.
    pub fn on_interval(&mut self, now: Instant) -> Option<Message> {
        self.reassembler.advance();

        for id in self.membership.expire(now, self.config.peer_ttl) {
            tracing::info!(peer = %id, "peer expired");
        }

        // Re-evaluate against the best surviving peer in case it was
        // learned while this node was still a follower.
        let top = self
            .membership
            .top_peer()
            .map(|p| (p.id.clone(), p.weight));
        if let Some((id, weight)) = top {
            if let Some(t) = self.leadership.observe(&id, weight) {
                self.apply(t, now);
            }
        }

        if let Some(t) = self.leadership.tick(now) {
            self.apply(t, now);
        }
        let higher_known = self.membership.local_outranked();
        if let Some(t) = self.leadership.trigger(now, higher_known) {
            self.apply(t, now);
        }

        match self.role() {
            Role::Follower => None,
            Role::Candidate | Role::Leader => Some(self.announcement(String::new(), now)),
        }
    }

    /// Build an announcement stamped with this node's identity and role.
    pub fn announcement(&mut self, content: String, now: Instant) -> Message {
        self.membership.set_local_state(self.role(), now);
        Message {
            content,
            candidate: self.candidate.clone(),
            state: self.role(),
            id: self.config.id.clone(),
            weight: self.config.weight,
            channels: self.config.channels.clone(),
        }
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            id: self.config.id.clone(),
            role: self.role(),
            leader: self.membership.leader().map(|n| n.id.clone()),
            peers: self.membership.peer_count(),
            in_flight: self.reassembler.in_flight(),
            reassembly: self.reassembler.stats(),
        }
    }

    fn apply(&mut self, t: Transition, now: Instant) {
        tracing::info!(from = %t.from, to = %t.to, id = %self.config.id, "role changed");
        self.membership.set_local_state(t.to, now);
    }
}
