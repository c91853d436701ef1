//! Signaling protocol spoken on the duplex channel.
//!
//! Every frame is a JSON value. Clients open with a `hello`; after that the
//! relay only originates the [`ServerMessage`] variants below and otherwise
//! forwards whatever the peer sent, untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which end of a pairing a connection claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Desktop,
    Phone,
}

impl Role {
    pub const ALL: [Self; 2] = [Self::Desktop, Self::Phone];

    /// The role occupying the opposite slot.
    pub const fn peer(self) -> Self {
        match self {
            Self::Desktop => Self::Phone,
            Self::Phone => Self::Desktop,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Phone => "phone",
        }
    }

    /// Capitalised form used in client-facing error text.
    pub const fn title(self) -> &'static str {
        match self {
            Self::Desktop => "Desktop",
            Self::Phone => "Phone",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names neither role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid role: {0:?}")]
pub struct InvalidRole(pub String);

impl FromStr for Role {
    type Err = InvalidRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desktop" => Ok(Self::Desktop),
            "phone" => Ok(Self::Phone),
            other => Err(InvalidRole(other.to_string())),
        }
    }
}

/// Messages the relay itself originates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Ready { role: Role },
    Error { message: String },
    PeerConnected { peer: Role },
    PeerDisconnected { peer: Role },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// The opening message of every connection.
///
/// `session_id` and `token` stay optional here: a hello that omits them is
/// well-formed but carries credentials that can never match, and is rejected
/// with the same answer as a wrong token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub role: Role,
    pub session_id: Option<String>,
    pub token: Option<String>,
}

/// Why a first message could not be read as a hello.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HelloError {
    #[error("Expected hello message")]
    NotHello,

    #[error("Invalid role")]
    InvalidRole,
}

impl Hello {
    /// Interpret an already-parsed JSON value as a hello.
    ///
    /// The `type` tag is checked before the role, matching the order in which
    /// clients are told what went wrong.
    pub fn from_value(value: &Value) -> Result<Self, HelloError> {
        if value.get("type").and_then(Value::as_str) != Some("hello") {
            return Err(HelloError::NotHello);
        }

        let role = value
            .get("role")
            .and_then(Value::as_str)
            .and_then(|r| r.parse::<Role>().ok())
            .ok_or(HelloError::InvalidRole)?;

        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_owned);

        Ok(Self {
            role,
            session_id: field("sessionId"),
            token: field("token"),
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_peer_is_opposite() {
        assert_eq!(Role::Desktop.peer(), Role::Phone);
        assert_eq!(Role::Phone.peer(), Role::Desktop);
        for role in Role::ALL {
            assert_eq!(role.peer().peer(), role);
        }
    }

    #[test]
    fn role_parse_rejects_unknown() {
        assert_eq!("desktop".parse::<Role>().unwrap(), Role::Desktop);
        assert_eq!("phone".parse::<Role>().unwrap(), Role::Phone);
        assert!("Desktop".parse::<Role>().is_err());
        assert!("tablet".parse::<Role>().is_err());
    }

    #[test]
    fn server_messages_use_kebab_case_tags() {
        let ready = serde_json::to_value(ServerMessage::Ready { role: Role::Phone }).unwrap();
        assert_eq!(ready, json!({"type": "ready", "role": "phone"}));

        let joined =
            serde_json::to_value(ServerMessage::PeerConnected { peer: Role::Desktop }).unwrap();
        assert_eq!(joined, json!({"type": "peer-connected", "peer": "desktop"}));

        let left =
            serde_json::to_value(ServerMessage::PeerDisconnected { peer: Role::Phone }).unwrap();
        assert_eq!(left, json!({"type": "peer-disconnected", "peer": "phone"}));

        let err = serde_json::to_value(ServerMessage::error("Hello timeout")).unwrap();
        assert_eq!(err, json!({"type": "error", "message": "Hello timeout"}));
    }

    #[test]
    fn hello_parses_all_fields() {
        let hello = Hello::from_value(&json!({
            "type": "hello",
            "role": "desktop",
            "sessionId": "abc",
            "token": "t0k",
        }))
        .unwrap();
        assert_eq!(hello.role, Role::Desktop);
        assert_eq!(hello.session_id.as_deref(), Some("abc"));
        assert_eq!(hello.token.as_deref(), Some("t0k"));
    }

    #[test]
    fn hello_type_checked_before_role() {
        let err = Hello::from_value(&json!({"type": "offer", "role": "nope"})).unwrap_err();
        assert_eq!(err, HelloError::NotHello);

        let err = Hello::from_value(&json!(["hello"])).unwrap_err();
        assert_eq!(err, HelloError::NotHello);
    }

    #[test]
    fn hello_with_bad_role() {
        let err = Hello::from_value(&json!({"type": "hello", "role": "tablet"})).unwrap_err();
        assert_eq!(err, HelloError::InvalidRole);

        let err = Hello::from_value(&json!({"type": "hello", "role": 7})).unwrap_err();
        assert_eq!(err, HelloError::InvalidRole);
    }

    #[test]
    fn hello_missing_credentials_still_parses() {
        let hello = Hello::from_value(&json!({"type": "hello", "role": "phone", "token": 5}))
            .unwrap();
        assert_eq!(hello.session_id, None);
        assert_eq!(hello.token, None);
    }
}
