//! pairlink Relay Server Library
//!
//! Core functionality for the pairlink signaling relay:
//! - In-memory session registry with secret tokens and TTL expiry
//! - Per-connection relay state machine pairing a desktop and a phone
//! - Background sweeper reclaiming idle sessions
//! - HTTP and WebSocket surface (axum)

pub mod registry;
pub mod relay;
pub mod server;
pub mod sweeper;
