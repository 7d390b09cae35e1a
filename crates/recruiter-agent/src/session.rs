//! Session state and the session store.
//!
//! Every session id maps to a slot: an async mutex around an optional
//! [`Session`]. A request holds the slot's lock for its whole turn, so turns
//! for one id run one at a time while distinct ids proceed concurrently.
//! A slot is created empty on first contact and removed again if the turn
//! ends without a session in it.

use crate::conversation::ConversationAgent;
use crate::knowledge::Posting;
use dashmap::DashMap;
use recruiter_core::{Error, Result, SessionConfig, SessionKey};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub type SessionSlot = Arc<Mutex<Option<Session>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingCandidateName,
    InConversation,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::AwaitingCandidateName => "awaiting_candidate_name",
            SessionPhase::InConversation => "in_conversation",
        }
    }
}

pub struct Session {
    posting: Posting,
    phase: SessionPhase,
    agent: Option<ConversationAgent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("posting", &self.posting)
            .field("phase", &self.phase)
            .field("has_agent", &self.agent.is_some())
            .finish()
    }
}

impl Session {
    /// A session whose posting is known and which waits for the candidate's name.
    pub fn awaiting_candidate(posting: Posting) -> Self {
        Self {
            posting,
            phase: SessionPhase::AwaitingCandidateName,
            agent: None,
        }
    }

    pub fn posting(&self) -> &Posting {
        &self.posting
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn agent(&self) -> Option<&ConversationAgent> {
        self.agent.as_ref()
    }

    pub fn agent_mut(&mut self) -> Option<&mut ConversationAgent> {
        self.agent.as_mut()
    }

    /// Install the session's one agent and move to `InConversation`.
    pub fn begin_conversation(&mut self, agent: ConversationAgent) -> &mut ConversationAgent {
        self.phase = SessionPhase::InConversation;
        self.agent.insert(agent)
    }
}

/// Storage for session slots, injected into the router.
pub trait SessionStore: Send + Sync {
    /// The slot for `key`, created empty if absent. Fails when the store is
    /// full and nothing can be evicted.
    fn acquire(&self, key: &SessionKey) -> Result<SessionSlot>;

    /// Whether `slot` is still the registered slot for `key`. A caller that
    /// waited on a slot's lock must check this before using it.
    fn is_current(&self, key: &SessionKey, slot: &SessionSlot) -> bool;

    /// End a turn on `slot`. An occupied slot is marked active; an empty one
    /// is removed. Call while still holding the slot's lock.
    fn release(&self, key: &SessionKey, slot: &SessionSlot, occupied: bool);

    fn get(&self, key: &SessionKey) -> Option<SessionSlot>;

    fn contains(&self, key: &SessionKey) -> bool {
        self.get(key).is_some()
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;

    fn keys(&self) -> Vec<SessionKey>;

    /// Drop sessions idle past the TTL; returns the evicted keys.
    fn evict_idle(&self) -> Vec<SessionKey>;
}

struct SlotEntry {
    slot: SessionSlot,
    last_active: Instant,
}

impl SlotEntry {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            last_active: Instant::now(),
        }
    }

    // A locked slot has a turn in flight and is never evicted.
    fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }
}

/// In-process session store with an idle TTL and a capacity bound.
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, SlotEntry>,
    capacity: usize,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(capacity: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            capacity: capacity.max(1),
            idle_ttl,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.capacity, config.idle_ttl())
    }

    fn make_room(&self) -> Result<()> {
        self.evict_idle();
        if self.sessions.len() < self.capacity {
            return Ok(());
        }

        let mut by_age: Vec<(SessionKey, Instant)> = self
            .sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().last_active))
            .collect();
        by_age.sort_by_key(|(_, at)| *at);

        for (key, _) in by_age {
            if self.sessions.remove_if(&key, |_, e| !e.is_busy()).is_some() {
                info!(event = "session_evicted", session_id = %key, reason = "capacity", "session evicted");
                if self.sessions.len() < self.capacity {
                    return Ok(());
                }
            }
        }

        warn!(
            event = "session_capacity_reached",
            capacity = self.capacity,
            "session store full, every session busy"
        );
        Err(Error::SessionCapacity {
            capacity: self.capacity,
        })
    }
}

impl SessionStore for SessionRegistry {
    fn acquire(&self, key: &SessionKey) -> Result<SessionSlot> {
        if let Some(entry) = self.sessions.get(key) {
            return Ok(entry.slot.clone());
        }
        if self.sessions.len() >= self.capacity {
            self.make_room()?;
        }
        Ok(self
            .sessions
            .entry(key.clone())
            .or_insert_with(SlotEntry::new)
            .slot
            .clone())
    }

    fn is_current(&self, key: &SessionKey, slot: &SessionSlot) -> bool {
        self.sessions
            .get(key)
            .is_some_and(|e| Arc::ptr_eq(&e.slot, slot))
    }

    fn release(&self, key: &SessionKey, slot: &SessionSlot, occupied: bool) {
        if occupied {
            if let Some(mut entry) = self.sessions.get_mut(key) {
                if Arc::ptr_eq(&entry.slot, slot) {
                    entry.last_active = Instant::now();
                }
            }
        } else {
            self.sessions
                .remove_if(key, |_, e| Arc::ptr_eq(&e.slot, slot));
        }
    }

    fn get(&self, key: &SessionKey) -> Option<SessionSlot> {
        self.sessions.get(key).map(|e| e.slot.clone())
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn keys(&self) -> Vec<SessionKey> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    fn evict_idle(&self) -> Vec<SessionKey> {
        let now = Instant::now();
        let stale: Vec<SessionKey> = self
            .sessions
            .iter()
            .filter(|e| now.duration_since(e.value().last_active) >= self.idle_ttl)
            .map(|e| e.key().clone())
            .collect();

        let mut evicted = Vec::new();
        for key in stale {
            let removed = self.sessions.remove_if(&key, |_, e| {
                now.duration_since(e.last_active) >= self.idle_ttl && !e.is_busy()
            });
            if removed.is_some() {
                info!(event = "session_evicted", session_id = %key, reason = "idle", "session evicted");
                evicted.push(key);
            }
        }
        evicted
    }
}
