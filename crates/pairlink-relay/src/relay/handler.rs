//! Per-connection state machine.
//!
//! ```text
//! AwaitingHello --hello ok--> Bound --announce--> Relaying
//!       |                                            |
//!       +----------------- any exit -----------------+--> Closed
//! ```
//!
//! The transport is abstracted away: the machine reads JSON text frames from
//! any [`Stream`] and writes through its own [`PeerHandle`], so the WebSocket
//! glue and the tests drive exactly the same code.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::de::IgnoredAny;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use pairlink_core::ServerMessage;
use pairlink_core::protocol::Hello;

use crate::registry::{BindError, Ending, SessionRegistry};
use crate::relay::binding::Binding;
use crate::relay::error::RelayError;
use crate::relay::peer::{ForwardError, Outbound, PeerHandle};

/// How long a connection's own replies may wait for room in its queue.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// The transport failed underneath the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// One inbound frame as the transport delivers it.
pub type Inbound = Result<String, TransportError>;

/// Why a connection reached `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// The client went away cleanly.
    Disconnected,
    /// The transport broke; handled exactly like a disconnect.
    TransportFailed(TransportError),
    /// The relay ended the connection and told the client why.
    Rejected(RelayError),
}

enum State {
    AwaitingHello,
    Bound(Binding, Option<PeerHandle>),
    Relaying(Binding),
    Closed(Exit, Option<Binding>),
}

/// Drives one accepted connection from hello to teardown.
pub struct Connection<S> {
    registry: Arc<SessionRegistry>,
    hello_timeout: Duration,
    inbound: S,
    outbound: PeerHandle,
}

impl<S> Connection<S>
where
    S: Stream<Item = Inbound> + Unpin + Send,
{
    pub const fn new(
        registry: Arc<SessionRegistry>,
        hello_timeout: Duration,
        inbound: S,
        outbound: PeerHandle,
    ) -> Self {
        Self {
            registry,
            hello_timeout,
            inbound,
            outbound,
        }
    }

    /// Run the connection to completion and report how it ended.
    #[instrument(name = "connection", skip_all, fields(connection_id = %self.outbound.id()))]
    pub async fn run(mut self) -> Exit {
        let mut state = State::AwaitingHello;
        loop {
            state = match state {
                State::AwaitingHello => match self.await_hello().await {
                    Ok((binding, peer)) => State::Bound(binding, peer),
                    Err(exit) => State::Closed(exit, None),
                },
                State::Bound(binding, peer) => {
                    announce(&binding, peer);
                    State::Relaying(binding)
                }
                State::Relaying(binding) => {
                    let exit = self.relay(&binding).await;
                    State::Closed(exit, Some(binding))
                }
                State::Closed(exit, binding) => {
                    close(&self.outbound, &exit, binding).await;
                    return exit;
                }
            };
        }
    }

    async fn await_hello(&mut self) -> Result<(Binding, Option<PeerHandle>), Exit> {
        let text = match timeout(self.hello_timeout, self.inbound.next()).await {
            Err(_) => return Err(Exit::Rejected(RelayError::HelloTimeout)),
            Ok(None) => return Err(Exit::Disconnected),
            Ok(Some(Err(e))) => return Err(Exit::TransportFailed(e)),
            Ok(Some(Ok(text))) => text,
        };

        let value: Value = serde_json::from_str(&text)
            .map_err(|_| Exit::Rejected(RelayError::ExpectedHello))?;
        let hello = Hello::from_value(&value).map_err(|e| Exit::Rejected(e.into()))?;

        let session = self
            .registry
            .authorize(hello.session_id.as_deref(), hello.token.as_deref())
            .await
            .ok_or(Exit::Rejected(RelayError::InvalidCredentials))?;

        let (binding, peer) = Binding::acquire(session, hello.role, self.outbound.clone())
            .map_err(|e| {
                Exit::Rejected(match e {
                    BindError::Occupied(role) => RelayError::SlotOccupied(role),
                    // Swept between lookup and bind: no longer resolvable.
                    BindError::Ended(_) => RelayError::InvalidCredentials,
                })
            })?;
        self.registry.touch(binding.session());
        Ok((binding, peer))
    }

    async fn relay(&mut self, binding: &Binding) -> Exit {
        loop {
            let text = match self.inbound.next().await {
                None => return Exit::Disconnected,
                Some(Err(e)) => return Exit::TransportFailed(e),
                Some(Ok(text)) => text,
            };

            if serde_json::from_str::<IgnoredAny>(&text).is_err() {
                return Exit::Rejected(RelayError::MalformedMessage);
            }

            match self.forward(binding, text) {
                Ok(()) => {}
                Err(err) if err.is_terminal() => return Exit::Rejected(err),
                Err(err) => {
                    let reply = Outbound::Server(ServerMessage::error(err.to_string()));
                    if !self.outbound.send(reply, REPLY_TIMEOUT).await {
                        debug!(error = %err, "Error reply not queued");
                    }
                }
            }
        }
    }

    fn forward(&self, binding: &Binding, payload: String) -> Result<(), RelayError> {
        let session = binding.session();
        self.registry.touch(session);

        let peer = session
            .peer_of(binding.role())
            .map_err(|ending| match ending {
                Ending::Expired => RelayError::SessionExpired,
                Ending::Closed => RelayError::SessionClosed,
            })?
            .ok_or(RelayError::PeerUnavailable)?;

        let len = payload.len();
        peer.forward(payload).map_err(|e| match e {
            ForwardError::Saturated => {
                warn!(
                    session_id = %session.id(),
                    from = %binding.role(),
                    "Peer queue full, message dropped"
                );
                RelayError::PeerSaturated
            }
            ForwardError::Gone => RelayError::PeerUnavailable,
        })?;
        debug!(session_id = %session.id(), from = %binding.role(), len, "Relayed message");
        Ok(())
    }
}

/// Entry action of `Bound`: tell the peer, if any, who arrived.
///
/// `ready` was already queued when the slot was taken.
fn announce(binding: &Binding, peer: Option<PeerHandle>) {
    let role = binding.role();
    if let Some(peer) = peer
        && !peer.notify(ServerMessage::PeerConnected { peer: role })
    {
        debug!(role = %role, "Peer unreachable for connect notice");
    }
}

async fn close(outbound: &PeerHandle, exit: &Exit, binding: Option<Binding>) {
    drop(binding);
    match exit {
        Exit::Rejected(err) => {
            info!(error = %err, kind = ?err.kind(), "Closing connection");
            let reply = Outbound::Server(ServerMessage::error(err.to_string()));
            if !(outbound.send(reply, REPLY_TIMEOUT).await
                && outbound.send(Outbound::Close, REPLY_TIMEOUT).await)
            {
                debug!("Client not reading, dropped rejection");
            }
        }
        Exit::Disconnected => debug!("Client disconnected"),
        Exit::TransportFailed(e) => debug!(error = %e, "Transport failed"),
    }
}
