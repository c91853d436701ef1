//! Failures a connection can hit, and what each one means for it.
//!
//! The `Display` text of every variant is exactly what the client receives in
//! its `error` message.

use pairlink_core::Role;
use pairlink_core::protocol::HelloError;

/// Broad category of a relay failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unexpected message.
    Protocol,
    /// Unknown session or wrong token.
    Auth,
    /// Role slot already taken.
    Conflict,
    /// Nobody in the opposite slot.
    PeerUnavailable,
    /// Peer is connected but not draining its queue.
    Backpressure,
    /// No hello in time.
    Timeout,
    /// Session removed while this connection was bound.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Expected hello message")]
    ExpectedHello,

    #[error("Invalid role")]
    InvalidRole,

    #[error("Invalid message")]
    MalformedMessage,

    /// Deliberately identical for an unknown id and a wrong token.
    #[error("Invalid session or token")]
    InvalidCredentials,

    #[error("{} already connected", .0.title())]
    SlotOccupied(Role),

    #[error("Peer not connected")]
    PeerUnavailable,

    #[error("Peer is not keeping up")]
    PeerSaturated,

    #[error("Hello timeout")]
    HelloTimeout,

    #[error("Session expired")]
    SessionExpired,

    #[error("Session closed")]
    SessionClosed,
}

impl RelayError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ExpectedHello | Self::InvalidRole | Self::MalformedMessage => {
                ErrorKind::Protocol
            }
            Self::InvalidCredentials => ErrorKind::Auth,
            Self::SlotOccupied(_) => ErrorKind::Conflict,
            Self::PeerUnavailable => ErrorKind::PeerUnavailable,
            Self::PeerSaturated => ErrorKind::Backpressure,
            Self::HelloTimeout => ErrorKind::Timeout,
            Self::SessionExpired | Self::SessionClosed => ErrorKind::Expired,
        }
    }

    /// Whether the connection must be closed after reporting this error.
    pub const fn is_terminal(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::PeerUnavailable | ErrorKind::Backpressure
        )
    }
}

impl From<HelloError> for RelayError {
    fn from(err: HelloError) -> Self {
        match err {
            HelloError::NotHello => Self::ExpectedHello,
            HelloError::InvalidRole => Self::InvalidRole,
        }
    }
}
