//! State relay server — entry point.
//!
//! Accepts WebSocket connections on `/ws`, assigns each one a session id, and
//! relays every client's `playerState` to all other connected clients as a
//! `state` message stamped with the sender's session id.
//!
//! # Usage
//!
//! ```text
//! relay-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>            TOML config file
//!   --bind <IP>                Interface to bind [default: 0.0.0.0]
//!   --port <PORT>              TCP port [default: 40000]
//!   --ws-path <PATH>           WebSocket upgrade path [default: /ws]
//!   --status-interval <SECS>   Session-count log interval, 0 = off [default: 30]
//! ```
//!
//! # Precedence
//!
//! Built-in defaults, then the `--config` file, then environment variables,
//! then command-line flags.
//!
//! | Variable                 | Flag                |
//! |--------------------------|---------------------|
//! | `RELAY_CONFIG`           | `--config`          |
//! | `RELAY_BIND`             | `--bind`            |
//! | `RELAY_PORT`             | `--port`            |
//! | `RELAY_WS_PATH`          | `--ws-path`         |
//! | `RELAY_STATUS_INTERVAL`  | `--status-interval` |

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_server::domain::ServerConfig;
use relay_server::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Real-time state relay over WebSocket.
///
/// Every flag is optional; unset flags fall through to the environment, the
/// config file, and finally the built-in defaults.
#[derive(Debug, Parser)]
#[command(
    name = "relay-server",
    about = "Real-time state-synchronisation relay over WebSocket",
    version
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind.
    ///
    /// `0.0.0.0` accepts connections on every interface, `127.0.0.1` only
    /// local ones.
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<IpAddr>,

    /// TCP port to listen on.
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// Request path upgraded to WebSocket.
    #[arg(long, env = "RELAY_WS_PATH")]
    ws_path: Option<String>,

    /// Seconds between "N sessions active" log lines; 0 disables them.
    #[arg(long, env = "RELAY_STATUS_INTERVAL")]
    status_interval: Option<u64>,
}

impl Cli {
    /// Layers the parsed flags over the config file (or the defaults).
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the final `ws_path` is not absolute.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ws_path) = self.ws_path {
            config.ws_path = ws_path;
        }
        if let Some(secs) = self.status_interval {
            config.status_interval_secs = secs;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// 1. Initialise `tracing` (`RUST_LOG`, default `info`).
/// 2. Parse the CLI and build the [`ServerConfig`].
/// 3. Install a Ctrl+C handler that clears the shared `running` flag.
/// 4. Run the accept loop until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_server_config()?;

    info!(
        "state relay starting — bind={}, path={}",
        config.socket_addr(),
        config.ws_path
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("state relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
