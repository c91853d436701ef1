//! Relay engine: per-connection handshake, role binding and forwarding.

pub mod binding;
pub mod error;
pub mod handler;
pub mod peer;


pub use binding::Binding;
pub use error::{ErrorKind, RelayError};
pub use handler::{Connection, Exit, Inbound, TransportError};
pub use peer::{ConnectionId, ForwardError, Outbound, PeerHandle};
