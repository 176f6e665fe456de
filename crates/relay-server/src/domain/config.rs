//! Relay server configuration.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is assembled in layers, lowest precedence first:
//!
//! 1. Built-in defaults ([`ServerConfig::default`]).
//! 2. An optional TOML file ([`ServerConfig::load`]).
//! 3. Environment variables and command-line flags (applied in `main.rs`).
//!
//! # TOML file format
//!
//! Every key is optional; absent keys keep their default.
//!
//! ```toml
//! bind = "0.0.0.0"
//! port = 40000
//! ws_path = "/ws"
//! status_interval_secs = 30
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default TCP port the relay listens on.
pub const DEFAULT_PORT: u16 = 40000;

/// Default HTTP path that is upgraded to WebSocket.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The WebSocket path does not start with `/`.
    #[error("ws_path must start with '/', got {0:?}")]
    InvalidWsPath(String),
}

/// All runtime configuration for the relay server.
///
/// Build this struct once at startup and hand it to
/// [`crate::infrastructure::RelayServer::bind`].
///
/// # Example
///
/// ```rust
/// use relay_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.socket_addr().port(), 40000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to bind.  `0.0.0.0` accepts connections on every interface.
    pub bind: IpAddr,

    /// TCP port to listen on.  `0` lets the OS pick a free port.
    pub port: u16,

    /// Request path that is upgraded to WebSocket.  Other paths get HTTP 404.
    pub ws_path: String,

    /// Seconds between "N sessions active" log lines.  `0` disables them.
    pub status_interval_secs: u64,
}

impl Default for ServerConfig {
    /// | Field                  | Default   |
    /// |------------------------|-----------|
    /// | bind                   | `0.0.0.0` |
    /// | port                   | `40000`   |
    /// | ws_path                | `/ws`     |
    /// | status_interval_secs   | `30`      |
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            ws_path: DEFAULT_WS_PATH.to_string(),
            status_interval_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document layered over the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or unknown keys, and
    /// [`ConfigError::InvalidWsPath`] if `ws_path` is not absolute.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, plus every
    /// error [`ServerConfig::from_toml_str`] can return.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWsPath`] if `ws_path` does not start with `/`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidWsPath(self.ws_path.clone()));
        }
        Ok(())
    }

    /// The address the listener binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Interval for the periodic status log, or `None` when disabled.
    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_secs > 0).then(|| Duration::from_secs(self.status_interval_secs))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
