//! Outbound handles for connections.
//!
//! A [`PeerHandle`] is the only thing a session slot stores: a bounded sender
//! into the connection's writer task. Holding one never keeps the connection
//! alive and dropping one never closes it.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use uuid::Uuid;

use pairlink_core::ServerMessage;

/// Identifies one accepted connection for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A frame queued for a connection's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A message the relay originates.
    Server(ServerMessage),
    /// A peer's message, exactly as it arrived.
    Relayed(String),
    /// Close the transport after everything queued before it.
    Close,
}

/// Why a relay into a peer did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardError {
    /// The peer's queue is full; the message was dropped.
    Saturated,
    /// The peer's writer is gone.
    Gone,
}

/// Sending half of a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

impl PeerHandle {
    pub const fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>) -> Self {
        Self { id, tx }
    }

    /// Create a handle and the receiver its writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(ConnectionId::new(), tx), rx)
    }

    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a frame on this connection's own path, waiting at most `limit`
    /// for room.
    ///
    /// Only the task that owns the connection calls this. Returns `false`
    /// once the writer has gone away or the queue stayed full.
    pub async fn send(&self, frame: Outbound, limit: Duration) -> bool {
        matches!(timeout(limit, self.tx.send(frame)).await, Ok(Ok(())))
    }

    /// Relay a peer message without waiting.
    pub fn forward(&self, payload: String) -> Result<(), ForwardError> {
        self.tx
            .try_send(Outbound::Relayed(payload))
            .map_err(|e| match e {
                TrySendError::Full(_) => ForwardError::Saturated,
                TrySendError::Closed(_) => ForwardError::Gone,
            })
    }

    /// Best-effort notification. Failures are reported but never retried.
    pub fn notify(&self, message: ServerMessage) -> bool {
        self.tx.try_send(Outbound::Server(message)).is_ok()
    }

    /// Best-effort close request, used when the connection is torn down from
    /// outside its own task.
    pub fn close(&self) -> bool {
        self.tx.try_send(Outbound::Close).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_core::Role;

    #[tokio::test]
    async fn forward_reports_saturation_then_gone() {
        let (handle, mut rx) = PeerHandle::channel(1);

        assert_eq!(handle.forward("a".into()), Ok(()));
        assert_eq!(handle.forward("b".into()), Err(ForwardError::Saturated));

        assert_eq!(rx.recv().await, Some(Outbound::Relayed("a".into())));
        drop(rx);
        assert_eq!(handle.forward("c".into()), Err(ForwardError::Gone));
    }

    #[tokio::test]
    async fn notify_is_best_effort() {
        let (handle, rx) = PeerHandle::channel(4);
        assert!(handle.notify(ServerMessage::PeerConnected { peer: Role::Phone }));
        drop(rx);
        assert!(!handle.notify(ServerMessage::PeerDisconnected { peer: Role::Phone }));
        assert!(!handle.close());
    }

    #[tokio::test(start_paused = true)]
    async fn send_gives_up_on_a_full_queue() {
        let (handle, mut rx) = PeerHandle::channel(1);
        let limit = Duration::from_secs(5);

        assert!(handle.send(Outbound::Close, limit).await);
        assert!(!handle.send(Outbound::Relayed("x".into()), limit).await);

        assert_eq!(rx.recv().await, Some(Outbound::Close));
        assert!(rx.try_recv().is_err());
        drop(rx);
        assert!(!handle.send(Outbound::Close, limit).await);
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
