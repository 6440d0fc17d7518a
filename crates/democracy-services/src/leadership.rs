//! Weighted leadership — decides Follower / Candidate / Leader for the
//! local node from its own weight and the announcements it observes.
//!
//! Ranking is total: higher weight wins, and on equal weight the
//! lexicographically smaller id wins.

use std::time::{Duration, Instant};

use democracy_core::Role;

/// True if `(a_weight, a_id)` ranks strictly above `(b_weight, b_id)`.
pub fn outranks(a_weight: u64, a_id: &str, b_weight: u64, b_id: &str) -> bool {
    a_weight > b_weight || (a_weight == b_weight && a_id < b_id)
}

/// Pick the single highest-ranked member. Deterministic for any input
/// order; `None` only for an empty set.
pub fn elect<'a, I>(members: I) -> Option<&'a str>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    members
        .into_iter()
        .fold(None, |best: Option<(&'a str, u64)>, (id, weight)| match best {
            Some((best_id, best_weight)) if !outranks(weight, id, best_weight, best_id) => best,
            _ => Some((id, weight)),
        })
        .map(|(id, _)| id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Role,
    pub to: Role,
}

pub struct Leadership {
    id: String,
    weight: u64,
    role: Role,
    candidate_since: Option<Instant>,
    timeout: Duration,
}

impl Leadership {
    pub fn new(id: impl Into<String>, weight: u64, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            weight,
            role: Role::Follower,
            candidate_since: None,
            timeout,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Local announce trigger. A follower that knows of no higher-ranked
    /// peer becomes a candidate and starts its observation window.
    pub fn trigger(&mut self, now: Instant, higher_known: bool) -> Option<Transition> {
        if self.role != Role::Follower || higher_known {
            return None;
        }
        self.candidate_since = Some(now);
        self.move_to(Role::Candidate)
    }

    /// Promote a candidate whose observation window elapsed without a
    /// higher-ranked announcement.
    pub fn tick(&mut self, now: Instant) -> Option<Transition> {
        match (self.role, self.candidate_since) {
            (Role::Candidate, Some(since)) if now.saturating_duration_since(since) >= self.timeout => {
                self.candidate_since = None;
                self.move_to(Role::Leader)
            }
            _ => None,
        }
    }

    /// Evaluate an announcement from a peer. A candidate or leader that
    /// is outranked falls back to follower immediately.
    pub fn observe(&mut self, peer_id: &str, peer_weight: u64) -> Option<Transition> {
        if self.role == Role::Follower || !outranks(peer_weight, peer_id, self.weight, &self.id) {
            return None;
        }
        self.candidate_since = None;
        self.move_to(Role::Follower)
    }

    fn move_to(&mut self, to: Role) -> Option<Transition> {
        let from = self.role;
        self.role = to;
        Some(Transition { from, to })
    }
}
