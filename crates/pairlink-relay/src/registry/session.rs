//! A single pairing session and its two role slots.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::time::Instant;
use tracing::debug;

use pairlink_core::{Role, ServerMessage};

use crate::relay::peer::{ConnectionId, PeerHandle};

/// How a session stopped accepting traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    /// Removed by the sweeper after sitting idle past the TTL.
    Expired,
    /// Removed on request by a holder of the token.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("{0} slot already occupied")]
    Occupied(Role),

    #[error("session ended: {0:?}")]
    Ended(Ending),
}

/// Public view of a session, as returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: String,
    pub desktop_connected: bool,
    pub phone_connected: bool,
    pub created_at: DateTime<Utc>,
}

struct SessionState {
    last_activity: Instant,
    desktop: Option<PeerHandle>,
    phone: Option<PeerHandle>,
    ending: Option<Ending>,
}

impl SessionState {
    const fn slot(&self, role: Role) -> Option<&PeerHandle> {
        match role {
            Role::Desktop => self.desktop.as_ref(),
            Role::Phone => self.phone.as_ref(),
        }
    }

    const fn slot_mut(&mut self, role: Role) -> &mut Option<PeerHandle> {
        match role {
            Role::Desktop => &mut self.desktop,
            Role::Phone => &mut self.phone,
        }
    }

    fn touch(&mut self, now: Instant) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}

/// Pairing context shared by every task that touches it.
///
/// The id and token never change. Everything mutable sits behind one mutex
/// that is never held across an `.await`, so "check the slot, then fill it"
/// is a single critical section.
pub struct Session {
    id: String,
    token: String,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl Session {
    pub(crate) fn new(id: String, token: String, now: Instant) -> Self {
        Self {
            id,
            token,
            created_at: Utc::now(),
            state: Mutex::new(SessionState {
                last_activity: now,
                desktop: None,
                phone: None,
                ending: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        // Nothing inside the critical sections can panic half-way through an
        // update, so a poisoned lock still guards consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compare a presented token in constant time.
    pub fn verify_token(&self, candidate: &str) -> bool {
        self.token.as_bytes().ct_eq(candidate.as_bytes()).into()
    }

    pub fn last_activity(&self) -> Instant {
        self.state().last_activity
    }

    /// Record activity. Never moves `last_activity` backwards.
    pub fn touch_at(&self, now: Instant) {
        self.state().touch(now);
    }

    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub fn ending(&self) -> Option<Ending> {
        self.state().ending
    }

    pub(crate) fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.state().last_activity) > ttl
    }

    /// Occupy `role` with `handle` if the slot is empty.
    ///
    /// `ready` is queued on `handle` before the slot is filled, so it is the
    /// first frame the connection sees even if the peer relays immediately.
    /// On success the current occupant of the opposite slot, if any, is
    /// returned so it can be told about the newcomer.
    pub fn bind(&self, role: Role, handle: PeerHandle) -> Result<Option<PeerHandle>, BindError> {
        let mut state = self.state();
        if let Some(ending) = state.ending {
            return Err(BindError::Ended(ending));
        }
        if state.slot(role).is_some() {
            return Err(BindError::Occupied(role));
        }
        if !handle.notify(ServerMessage::Ready { role }) {
            debug!(session_id = %self.id, role = %role, "Ready not queued");
        }
        *state.slot_mut(role) = Some(handle);
        Ok(state.slot(role.peer()).cloned())
    }

    /// Empty `role` if `conn` still holds it.
    ///
    /// Returns the opposite occupant when the release happened on a live
    /// session, i.e. when that occupant should hear about it.
    pub fn release(&self, role: Role, conn: ConnectionId) -> Option<PeerHandle> {
        let mut state = self.state();
        let slot = state.slot_mut(role);
        if slot.as_ref().is_none_or(|h| h.id() != conn) {
            return None;
        }
        *slot = None;
        if state.ending.is_some() {
            return None;
        }
        state.slot(role.peer()).cloned()
    }

    /// Current occupant of the slot opposite `role`.
    pub fn peer_of(&self, role: Role) -> Result<Option<PeerHandle>, Ending> {
        let state = self.state();
        match state.ending {
            Some(ending) => Err(ending),
            None => Ok(state.slot(role.peer()).cloned()),
        }
    }

    /// Whether a connection occupies `role`.
    pub fn is_bound(&self, role: Role) -> bool {
        self.state().slot(role).is_some()
    }

    /// Stop the session and hand back whoever was still bound.
    ///
    /// Only the first call has an effect; later calls return nothing.
    pub(crate) fn end(&self, ending: Ending) -> Vec<PeerHandle> {
        let mut state = self.state();
        if state.ending.is_some() {
            return Vec::new();
        }
        state.ending = Some(ending);
        [state.desktop.take(), state.phone.take()]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn status(&self) -> SessionStatus {
        let state = self.state();
        SessionStatus {
            session_id: self.id.clone(),
            desktop_connected: state.desktop.is_some(),
            phone_connected: state.phone.is_some(),
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
