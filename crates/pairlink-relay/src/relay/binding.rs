//! Scoped ownership of a role slot.

use std::sync::Arc;

use tracing::{debug, info};

use pairlink_core::{Role, ServerMessage};

use crate::registry::{BindError, Session};
use crate::relay::peer::{ConnectionId, PeerHandle};

/// A connection's claim on one slot of a session.
///
/// Dropping the binding empties the slot and tells the opposite occupant, if
/// any, that this role left. Because this happens in `Drop`, it runs on every
/// exit path of the connection task, including cancellation.
#[derive(Debug)]
pub struct Binding {
    session: Arc<Session>,
    role: Role,
    conn: ConnectionId,
}

impl Binding {
    /// Claim `role` in `session` for the connection behind `handle`.
    ///
    /// Returns the binding together with the peer that was already present.
    pub fn acquire(
        session: Arc<Session>,
        role: Role,
        handle: PeerHandle,
    ) -> Result<(Self, Option<PeerHandle>), BindError> {
        let conn = handle.id();
        let peer = session.bind(role, handle)?;
        info!(
            session_id = %session.id(),
            role = %role,
            connection_id = %conn,
            peer_present = peer.is_some(),
            "Role bound"
        );
        Ok((
            Self {
                session,
                role,
                conn,
            },
            peer,
        ))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub const fn role(&self) -> Role {
        self.role
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        let peer = self.session.release(self.role, self.conn);
        info!(
            session_id = %self.session.id(),
            role = %self.role,
            connection_id = %self.conn,
            "Role released"
        );
        if let Some(peer) = peer
            && !peer.notify(ServerMessage::PeerDisconnected { peer: self.role })
        {
            debug!(
                session_id = %self.session.id(),
                role = %self.role,
                "Peer unreachable for disconnect notice"
            );
        }
    }
}
