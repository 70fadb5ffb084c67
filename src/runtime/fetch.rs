//! Tickets for auxiliary requests and the stale-response guard.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Identifies one mounted wizard. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request the caller has to perform and hand back with its result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    pub session: SessionId,
    pub key: String,
    pub seq: u64,
}

#[derive(Debug, Clone, Default)]
struct KeyRunState {
    sequence: u64,
    in_flight: Option<u64>,
}

impl KeyRunState {
    fn next_seq(&mut self) -> u64 {
        self.sequence = self.sequence.saturating_add(1);
        self.in_flight = Some(self.sequence);
        self.sequence
    }

    /// Only the latest issued request may finish.
    fn on_finished(&mut self, seq: u64) -> bool {
        if self.in_flight != Some(seq) {
            return false;
        }
        self.in_flight = None;
        true
    }
}

#[derive(Debug, Clone)]
pub struct FetchRegistry {
    session: SessionId,
    keys: HashMap<String, KeyRunState>,
    queued: Vec<FetchTicket>,
}

impl FetchRegistry {
    pub fn new(session: SessionId) -> Self {
        Self {
            session,
            keys: HashMap::new(),
            queued: Vec::new(),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Issues a ticket for `key`; an earlier ticket for the same key goes
    /// stale.
    pub fn issue(&mut self, key: &str) -> FetchTicket {
        let seq = self.keys.entry(key.to_string()).or_default().next_seq();
        let ticket = FetchTicket {
            session: self.session,
            key: key.to_string(),
            seq,
        };
        self.queued.retain(|queued| queued.key != key);
        self.queued.push(ticket.clone());
        ticket
    }

    pub fn queued(&self) -> &[FetchTicket] {
        self.queued.as_slice()
    }

    pub fn take_queued(&mut self) -> Vec<FetchTicket> {
        std::mem::take(&mut self.queued)
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.keys
            .get(key)
            .is_some_and(|state| state.in_flight.is_some())
    }

    /// Whether a finished ticket may be applied. Accepting a ticket
    /// consumes it.
    pub fn accept(&mut self, ticket: &FetchTicket) -> bool {
        if ticket.session != self.session {
            return false;
        }
        let accepted = self
            .keys
            .get_mut(ticket.key.as_str())
            .is_some_and(|state| state.on_finished(ticket.seq));
        if accepted {
            self.queued.retain(|queued| queued != ticket);
        }
        accepted
    }

    /// Forgets every outstanding ticket.
    pub fn clear(&mut self) {
        for state in self.keys.values_mut() {
            state.in_flight = None;
        }
        self.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchRegistry, SessionId};

    #[test]
    fn session_ids_are_unique() {
        let first = SessionId::next();
        let second = SessionId::next();
        assert!(second > first);
    }

    #[test]
    fn reissued_key_makes_the_older_ticket_stale() {
        let mut registry = FetchRegistry::new(SessionId::next());
        let old = registry.issue("networks");
        let new = registry.issue("networks");
        assert_eq!(registry.queued(), std::slice::from_ref(&new));
        assert!(!registry.accept(&old));
        assert!(registry.accept(&new));
        assert!(!registry.accept(&new));
    }

    #[test]
    fn tickets_of_another_session_are_rejected() {
        let mut mounted = FetchRegistry::new(SessionId::next());
        let mut previous = FetchRegistry::new(SessionId::next());
        let foreign = previous.issue("images");
        mounted.issue("images");
        assert!(!mounted.accept(&foreign));
        assert!(mounted.is_in_flight("images"));
    }

    #[test]
    fn cleared_registry_drops_outstanding_tickets() {
        let mut registry = FetchRegistry::new(SessionId::next());
        let ticket = registry.issue("hosts");
        registry.clear();
        assert!(registry.take_queued().is_empty());
        assert!(!registry.accept(&ticket));
    }
}
