//! `pairlink` Core Library
//!
//! Shared functionality for `pairlink` components:
//! - Signaling protocol types (roles, server-originated messages)
//! - Relay configuration with file and CLI layering
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod error;
pub mod protocol;
pub mod tracing_init;

pub use config::RelayConfig;
pub use error::{Error, Result};
pub use protocol::{Role, ServerMessage};
