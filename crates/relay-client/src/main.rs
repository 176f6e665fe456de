//! State relay demo client — entry point.
//!
//! ```text
//! relay-client [OPTIONS]
//!
//! Options:
//!   --url <URL>              Relay endpoint [default: ws://127.0.0.1:40000/ws]
//!   --username <NAME>        Name sent in the login [default: player]
//!   --interval-ms <MS>       Time between state updates [default: 1000]
//!   --count <N>              Exit after N updates (runs forever if unset)
//! ```
//!
//! Each flag can also be set with `RELAY_URL`, `RELAY_USERNAME`,
//! `RELAY_INTERVAL_MS` and `RELAY_COUNT`.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_client::{run, ClientConfig, DEFAULT_URL};

/// Logs in to a state relay and streams random player positions.
#[derive(Debug, Parser)]
#[command(name = "relay-client", about = "Demo client for the state relay", version)]
struct Cli {
    /// WebSocket URL of the relay.
    #[arg(long, default_value = DEFAULT_URL, env = "RELAY_URL")]
    url: String,

    /// Username sent in the login message.
    #[arg(long, default_value = "player", env = "RELAY_USERNAME")]
    username: String,

    /// Milliseconds between two player-state updates.
    #[arg(long, default_value_t = 1000, env = "RELAY_INTERVAL_MS")]
    interval_ms: u64,

    /// Stop after this many updates.
    #[arg(long, env = "RELAY_COUNT")]
    count: Option<u64>,
}

impl Cli {
    fn into_client_config(self) -> anyhow::Result<ClientConfig> {
        anyhow::ensure!(self.interval_ms > 0, "--interval-ms must be greater than zero");
        Ok(ClientConfig {
            url: self.url,
            username: self.username,
            interval: Duration::from_millis(self.interval_ms),
            max_updates: self.count,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_client_config()?;
    let url = config.url.clone();
    info!("relay client starting — url={url}, user={}", config.username);

    run(config)
        .await
        .with_context(|| format!("relay client for {url} stopped"))?;

    info!("relay client finished");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
