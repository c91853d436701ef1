//! In-memory session registry.
//!
//! Owns every live [`Session`], issues ids and secret tokens, and reclaims
//! sessions that sit idle past the TTL. There is no persistence: a restart
//! forgets everything.

pub mod session;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use pairlink_core::ServerMessage;

use crate::relay::RelayError;

pub use session::{BindError, Ending, Session, SessionStatus};

/// Random bytes behind every session token.
pub const TOKEN_BYTES: usize = 32;

/// Identifier and secret handed to whoever created a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    pub session_id: String,
    pub token: String,
}

/// Thread-safe registry of pairing sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a session with empty slots and return its credentials.
    pub async fn create(&self) -> SessionCredentials {
        let token = generate_token();
        let mut sessions = self.sessions.write().await;
        let session_id = loop {
            let candidate = uuid::Uuid::new_v4().to_string();
            if let Entry::Vacant(entry) = sessions.entry(candidate.clone()) {
                entry.insert(Arc::new(Session::new(
                    candidate.clone(),
                    token.clone(),
                    Instant::now(),
                )));
                break candidate;
            }
        };
        drop(sessions);

        info!(session_id = %session_id, "Session created");
        SessionCredentials { session_id, token }
    }

    /// Look up a session by id.
    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Look up a session and check the presented token.
    ///
    /// An unknown id and a wrong token both yield `None`, so callers cannot
    /// tell which half of the credential was wrong.
    pub async fn authorize(
        &self,
        session_id: Option<&str>,
        token: Option<&str>,
    ) -> Option<Arc<Session>> {
        let session = self.get(session_id?).await;
        let token = token.unwrap_or_default();
        session.filter(|s| s.verify_token(token))
    }

    /// Record activity on a session.
    pub fn touch(&self, session: &Session) {
        session.touch();
    }

    /// Remove every session idle for longer than the TTL as of `now`.
    ///
    /// Removed sessions are marked expired so connections still bound to
    /// them stop relaying; nobody is notified. Returns the number removed.
    pub async fn sweep(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, session| {
            if !session.is_idle(now, self.ttl) {
                return true;
            }
            let orphaned = session.end(Ending::Expired).len();
            debug!(session_id = %id, orphaned, "Session expired");
            false
        });
        let removed = before - sessions.len();
        drop(sessions);

        if removed > 0 {
            info!(removed, "Swept expired sessions");
        }
        removed
    }

    /// Explicitly close a session on behalf of a token holder.
    ///
    /// Bound connections are told the session is closed and then closed
    /// themselves. Returns `false` for an unknown id or a wrong token.
    pub async fn close(&self, session_id: &str, token: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let authorized = sessions
            .get(session_id)
            .is_some_and(|s| s.verify_token(token));
        if !authorized {
            return false;
        }
        let Some(session) = sessions.remove(session_id) else {
            return false;
        };
        drop(sessions);

        let occupants = session.end(Ending::Closed);
        for handle in &occupants {
            handle.notify(ServerMessage::error(RelayError::SessionClosed.to_string()));
            handle.close();
        }
        info!(session_id = %session_id, evicted = occupants.len(), "Session closed");
        true
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// URL-safe token carrying [`TOKEN_BYTES`] of fresh randomness, unrelated to
/// the session id.
fn generate_token() -> String {
    let bytes: [u8; TOKEN_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::relay::peer::{Outbound, PeerHandle};
    use pairlink_core::Role;

    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn create_and_get_session() {
        let registry = SessionRegistry::new(TTL);
        let creds = registry.create().await;

        let session = registry.get(&creds.session_id).await.unwrap();
        assert_eq!(session.id(), creds.session_id);
        assert!(session.verify_token(&creds.token));
        assert!(!session.is_bound(Role::Desktop));
        assert!(!session.is_bound(Role::Phone));
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn tokens_are_url_safe_and_high_entropy() {
        let registry = SessionRegistry::new(TTL);
        let mut tokens = HashSet::new();
        let mut byte_values = HashSet::new();

        for _ in 0..200 {
            let creds = registry.create().await;
            // 32 bytes, unpadded base64
            assert_eq!(creds.token.len(), 43);
            assert!(
                creds
                    .token
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
            );
            assert!(!creds.token.contains(&creds.session_id));
            assert!(!creds.session_id.contains(&creds.token));

            let decoded = URL_SAFE_NO_PAD.decode(&creds.token).unwrap();
            assert_eq!(decoded.len(), TOKEN_BYTES);
            byte_values.extend(decoded);
            tokens.insert(creds.token);
        }

        assert_eq!(tokens.len(), 200);
        // 6400 random bytes should cover nearly the whole byte range.
        assert!(byte_values.len() > 240, "only {} byte values", byte_values.len());
    }

    #[tokio::test]
    async fn authorize_does_not_distinguish_failures() {
        let registry = SessionRegistry::new(TTL);
        let creds = registry.create().await;

        assert!(
            registry
                .authorize(Some(&creds.session_id), Some(&creds.token))
                .await
                .is_some()
        );
        assert!(
            registry
                .authorize(Some(&creds.session_id), Some("wrong"))
                .await
                .is_none()
        );
        assert!(
            registry
                .authorize(Some("unknown"), Some(&creds.token))
                .await
                .is_none()
        );
        assert!(registry.authorize(Some(&creds.session_id), None).await.is_none());
        assert!(registry.authorize(None, Some(&creds.token)).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_binds_admit_exactly_one() {
        let registry = Arc::new(SessionRegistry::new(TTL));
        let creds = registry.create().await;
        let session = registry.get(&creds.session_id).await.unwrap();

        let barrier = Arc::new(tokio::sync::Barrier::new(32));
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let session = Arc::clone(&session);
            let barrier = Arc::clone(&barrier);
            tasks.push(tokio::spawn(async move {
                let (handle, rx) = PeerHandle::channel(4);
                barrier.wait().await;
                let result = session.bind(Role::Desktop, handle);
                (result, rx)
            }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        let mut receivers = Vec::new();
        for task in tasks {
            let (result, rx) = task.await.unwrap();
            receivers.push(rx);
            match result {
                Ok(_) => successes += 1,
                Err(BindError::Occupied(Role::Desktop)) => conflicts += 1,
                Err(other) => panic!("unexpected bind error: {other:?}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 31);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_idle_sessions() {
        let registry = SessionRegistry::new(TTL);
        let idle = registry.create().await;
        let active = registry.create().await;

        tokio::time::advance(Duration::from_secs(590)).await;
        registry.touch(&registry.get(&active.session_id).await.unwrap());

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(registry.sweep(Instant::now()).await, 1);

        assert!(registry.get(&idle.session_id).await.is_none());
        assert!(registry.get(&active.session_id).await.is_some());
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn swept_session_is_marked_expired() {
        let registry = SessionRegistry::new(TTL);
        let creds = registry.create().await;
        let session = registry.get(&creds.session_id).await.unwrap();
        let (handle, _rx) = PeerHandle::channel(4);
        session.bind(Role::Desktop, handle).unwrap();

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        registry.sweep(Instant::now()).await;

        assert_eq!(session.ending(), Some(Ending::Expired));
        assert_eq!(session.peer_of(Role::Desktop).unwrap_err(), Ending::Expired);
    }

    #[tokio::test]
    async fn close_requires_token_and_evicts_occupants() {
        let registry = SessionRegistry::new(TTL);
        let creds = registry.create().await;
        let session = registry.get(&creds.session_id).await.unwrap();
        let (handle, mut rx) = PeerHandle::channel(4);
        session.bind(Role::Phone, handle).unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Server(ServerMessage::Ready { role: Role::Phone }))
        );

        assert!(!registry.close(&creds.session_id, "wrong").await);
        assert!(!registry.close("unknown", &creds.token).await);
        assert!(registry.close(&creds.session_id, &creds.token).await);
        assert!(registry.get(&creds.session_id).await.is_none());

        assert_eq!(
            rx.recv().await,
            Some(Outbound::Server(ServerMessage::error("Session closed")))
        );
        assert_eq!(rx.recv().await, Some(Outbound::Close));
    }
}
