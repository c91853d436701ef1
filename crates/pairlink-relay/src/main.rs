//! pairlink Relay Server
//!
//! Pairs a desktop and a phone into one session and relays their signaling
//! messages over WebSocket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use pairlink_core::RelayConfig;
use pairlink_core::tracing_init::{LogFormat, init_tracing};
use pairlink_relay::server::{self, AppState};
use pairlink_relay::sweeper::spawn_sweep_task;

#[derive(Parser, Debug)]
#[command(name = "pairlink-relay")]
#[command(version, about = "pairlink signaling relay - desktop/phone session pairing")]
struct Args {
    /// JSON config file. Flags below override its values.
    #[arg(long, env = "PAIRLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, env = "PAIRLINK_ADDR")]
    addr: Option<SocketAddr>,

    /// Seconds a new connection has to send its hello.
    #[arg(long)]
    hello_timeout: Option<u64>,

    /// Seconds of inactivity after which a session is reclaimed.
    #[arg(long)]
    session_ttl: Option<u64>,

    /// Seconds between expiry sweeps.
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Outbound frames buffered per connection.
    #[arg(long)]
    peer_queue_capacity: Option<usize>,

    /// Base URL prepended to the phone link handed out on session creation.
    #[arg(long, env = "PAIRLINK_PUBLIC_URL")]
    public_base_url: Option<String>,

    /// Allow cross-origin requests from any origin.
    #[arg(long)]
    allow_any_origin: bool,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,
}

impl Args {
    /// Layer command-line values over the file/default configuration.
    fn apply(&self, config: &mut RelayConfig) {
        if let Some(addr) = self.addr {
            config.listen_addr = addr;
        }
        if let Some(secs) = self.hello_timeout {
            config.hello_timeout_secs = secs;
        }
        if let Some(secs) = self.session_ttl {
            config.session_ttl_secs = secs;
        }
        if let Some(secs) = self.sweep_interval {
            config.sweep_interval_secs = secs;
        }
        if let Some(capacity) = self.peer_queue_capacity {
            config.peer_queue_capacity = capacity;
        }
        if let Some(url) = &self.public_base_url {
            config.public_base_url.clone_from(url);
        }
        config.allow_any_origin |= self.allow_any_origin;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing("pairlink_relay=info", LogFormat::from_json_flag(args.log_json));

    let mut config = RelayConfig::resolve(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.listen_addr,
        session_ttl_secs = config.session_ttl_secs,
        hello_timeout_secs = config.hello_timeout_secs,
        "Starting pairlink-relay"
    );

    let state = AppState::new(config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweep_task(
        Arc::clone(&state.registry),
        state.config.sweep_interval(),
        shutdown_rx,
    );

    let listener = tokio::net::TcpListener::bind(state.config.listen_addr).await?;
    info!(addr = %listener.local_addr()?, "Relay listening");

    server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal");
    })
    .await?;

    let _ = shutdown_tx.send(true);
    sweeper.await?;
    info!("Relay stopped");
    Ok(())
}
