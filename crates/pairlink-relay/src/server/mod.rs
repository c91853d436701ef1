//! HTTP and WebSocket surface of the relay.

pub mod routes;
pub mod ws;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use pairlink_core::RelayConfig;

use crate::registry::SessionRegistry;

pub use routes::{ApiError, CreateSessionResponse};

/// Shared application state, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    /// Build state with a fresh registry sized by `config`.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(config.session_ttl())),
            config: Arc::new(config),
        }
    }
}

/// Assemble the full router.
pub fn build_router(state: AppState) -> Router {
    let allow_any_origin = state.config.allow_any_origin;
    let router = Router::new()
        .route("/", get(routes::root))
        .route("/api/session", post(routes::create_session))
        .route(
            "/api/session/{session_id}",
            get(routes::session_status).delete(routes::close_session),
        )
        .route("/ws", get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if allow_any_origin {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Serve `state` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
