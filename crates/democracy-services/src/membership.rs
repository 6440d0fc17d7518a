//! Membership view. Every node this one knows about, itself included.
//!
//! Entries are created on the first announcement from a peer and
//! refreshed on each later one. Peers that stay silent past the TTL are
//! dropped by [`MembershipView::expire`].

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use democracy_core::{Message, Role};

use crate::leadership::{elect, outranks};

/// What this node knows about one member of the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: String,
    /// `host:port` the member announces from.
    pub source_address: String,
    /// Fixed at first observation.
    pub weight: u64,
    pub state: Role,
    pub last_seen: Instant,
    pub channels: BTreeSet<String>,
    /// Ids of the members that defer to this one, highest rank first.
    /// Only filled in for the local node while it leads.
    pub voters: Vec<String>,
}

impl NodeIdentity {
    pub fn new(id: impl Into<String>, source_address: impl Into<String>, weight: u64, now: Instant) -> Self {
        Self {
            id: id.into(),
            source_address: source_address.into(),
            weight,
            state: Role::Follower,
            last_seen: now,
            channels: BTreeSet::new(),
            voters: Vec::new(),
        }
    }

    /// True if this member ranks strictly above `other`.
    pub fn outranks(&self, other: &NodeIdentity) -> bool {
        outranks(self.weight, &self.id, other.weight, &other.id)
    }
}

pub struct MembershipView {
    local: NodeIdentity,
    peers: HashMap<String, NodeIdentity>,
}

impl MembershipView {
    pub fn new(local: NodeIdentity) -> Self {
        Self {
            local,
            peers: HashMap::new(),
        }
    }

    pub fn local(&self) -> &NodeIdentity {
        &self.local
    }

    pub fn get(&self, id: &str) -> Option<&NodeIdentity> {
        if id == self.local.id {
            Some(&self.local)
        } else {
            self.peers.get(id)
        }
    }

    pub fn peers(&self) -> impl Iterator<Item = &NodeIdentity> {
        self.peers.values()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Record an announcement. Returns the sender's entry, or `None` for
    /// the local node's own announcements.
    pub fn observe(&mut self, message: &Message, now: Instant) -> Option<&NodeIdentity> {
        let id = message.sender_id();
        if id == self.local.id {
            return None;
        }

        let entry = self.peers.entry(id.to_owned()).or_insert_with(|| {
            tracing::info!(peer = id, weight = message.weight, addr = %message.candidate, "new peer");
            NodeIdentity::new(id, message.candidate.clone(), message.weight, now)
        });

        if entry.weight != message.weight {
            tracing::warn!(
                peer = %entry.id,
                recorded = entry.weight,
                announced = message.weight,
                "peer announced a different weight, keeping recorded weight"
            );
        }
        entry.source_address.clone_from(&message.candidate);
        entry.state = message.state;
        entry.last_seen = now;
        entry.channels = message.channels.iter().cloned().collect();
        Some(&*entry)
    }

    /// Update the local node's role after a transition.
    pub fn set_local_state(&mut self, state: Role, now: Instant) {
        self.local.state = state;
        self.local.last_seen = now;
        self.local.voters = if state == Role::Leader {
            self.ranked_peers().into_iter().map(|p| p.id.clone()).collect()
        } else {
            Vec::new()
        };
    }

    /// Remove peers not seen within `ttl`. Returns the removed ids.
    pub fn expire(&mut self, now: Instant, ttl: Duration) -> Vec<String> {
        let mut removed = Vec::new();
        self.peers.retain(|id, peer| {
            let alive = now.saturating_duration_since(peer.last_seen) < ttl;
            if !alive {
                removed.push(id.clone());
            }
            alive
        });
        removed
    }

    /// The highest-ranked peer, excluding the local node.
    pub fn top_peer(&self) -> Option<&NodeIdentity> {
        elect(self.peers.values().map(|p| (p.id.as_str(), p.weight))).and_then(|id| self.peers.get(id))
    }

    /// True if any known peer ranks above the local node.
    pub fn local_outranked(&self) -> bool {
        self.top_peer().is_some_and(|p| p.outranks(&self.local))
    }

    /// The member that should lead given everything currently known.
    pub fn highest_ranked(&self) -> &NodeIdentity {
        match self.top_peer() {
            Some(peer) if peer.outranks(&self.local) => peer,
            _ => &self.local,
        }
    }

    /// Peers ordered by rank, highest first.
    pub fn ranked_peers(&self) -> Vec<&NodeIdentity> {
        let mut peers: Vec<&NodeIdentity> = self.peers.values().collect();
        peers.sort_by(|a, b| {
            if a.outranks(b) {
                std::cmp::Ordering::Less
            } else if b.outranks(a) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        });
        peers
    }

    /// The member currently believed to lead: the local node if it leads,
    /// otherwise the highest-ranked peer that announced itself leader.
    pub fn leader(&self) -> Option<&NodeIdentity> {
        if self.local.state == Role::Leader {
            return Some(&self.local);
        }
        self.ranked_peers()
            .into_iter()
            .find(|p| p.state == Role::Leader)
    }
}
