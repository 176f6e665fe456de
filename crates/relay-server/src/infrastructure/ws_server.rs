//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections.
//! 3. Upgrading each connection on the configured path to WebSocket, and
//!    rejecting every other path with HTTP 404.
//! 4. Handing the upgraded connection to [`run_session`] on its own task.
//! 5. Logging the number of live sessions at a fixed interval.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! A failed handshake or a broken session only affects that one connection.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::application::{run_session, Router, RouterHandle};
use crate::domain::ServerConfig;
use crate::infrastructure::connection::websocket;

/// How long one `accept()` waits before re-checking the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound relay: listener plus the router that all its sessions share.
///
/// Binding and running are separate steps so callers (and tests) can learn
/// the actual port before the accept loop starts.
pub struct RelayServer {
    listener: TcpListener,
    config: ServerConfig,
    router: RouterHandle,
}

impl RelayServer {
    /// Binds the listener and starts the router task.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the address cannot
    /// be bound (port in use, missing permission).
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind relay listener on {addr}"))?;

        // The router task outlives the server for as long as sessions hold
        // handles to it.
        let (router, _router_task) = Router::spawn();

        Ok(Self {
            listener,
            config,
            router,
        })
    }

    /// The address the listener is actually bound to.
    ///
    /// # Errors
    ///
    /// Propagates the OS error if the socket address cannot be queried.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("failed to read listener address")
    }

    /// A handle to this server's router, for diagnostics.
    pub fn router(&self) -> RouterHandle {
        self.router.clone()
    }

    /// Accepts connections until `running` is set to `false`.
    ///
    /// # Errors
    ///
    /// Currently infallible once bound; accept errors are logged and skipped.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let local = self.local_addr()?;
        info!("relay listening on ws://{local}{}", self.config.ws_path);

        // Shared by every connection task.
        let ws_path: Arc<str> = Arc::from(self.config.ws_path.as_str());
        let status_task = self
            .config
            .status_interval()
            .map(|period| spawn_status_log(self.router.clone(), period));

        loop {
            // Check the shutdown flag before each accept attempt.
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // Bounded wait so the flag is re-checked even when nobody connects.
            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                Ok(Ok((stream, peer))) => {
                    debug!("tcp connection from {peer}");
                    // One task per connection; each gets its own router handle
                    // so the accept loop never waits on a handshake.
                    let router = self.router.clone();
                    let path = Arc::clone(&ws_path);
                    tokio::spawn(async move {
                        handle_connection(stream, peer, path, router).await;
                    });
                }
                Ok(Err(e)) => {
                    // Transient (e.g. out of file descriptors); keep serving.
                    error!("accept error: {e}");
                }
                Err(_) => {
                    // No connection within ACCEPT_POLL; loop back to the flag.
                }
            }
        }

        // Sessions already running finish on their own; only the status
        // reporter is tied to the accept loop.
        if let Some(task) = status_task {
            task.abort();
        }
        Ok(())
    }
}

/// Binds according to `config` and runs the accept loop until `running` is
/// cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.  This is the only
/// process-fatal failure.
pub async fn run_server(config: ServerConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    RelayServer::bind(config).await?.run(running).await
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Upgrades one TCP connection and runs its session to the end.
///
/// The session logs its own start and end; only handshake failures are
/// reported here.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ws_path: Arc<str>,
    router: RouterHandle,
) {
    let upgrade = accept_hdr_async(stream, move |request: &Request, response: Response| {
        check_path(request, response, &ws_path)
    })
    .await;

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {peer} failed: {e}");
            return;
        }
    };

    let (reader, writer) = websocket::split(ws);
    let _ = run_session(reader, writer, router, peer).await;
}

/// Handshake callback: only `ws_path` is upgraded, everything else is a 404.
fn check_path(
    request: &Request,
    response: Response,
    ws_path: &str,
) -> Result<Response, ErrorResponse> {
    if request.uri().path() == ws_path {
        return Ok(response);
    }
    debug!("rejecting upgrade on {}", request.uri().path());
    let mut reject = ErrorResponse::new(Some("not found".to_string()));
    *reject.status_mut() = StatusCode::NOT_FOUND;
    Err(reject)
}

fn spawn_status_log(router: RouterHandle, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match router.session_count().await {
                Ok(count) => info!("{count} sessions active"),
                Err(_) => break,
            }
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> Request {
        Request::builder().uri(path).body(()).unwrap()
    }

    #[test]
    fn test_check_path_accepts_configured_path() {
        let result = check_path(&request("/ws"), Response::new(()), "/ws");
        assert!(result.is_ok());
    }

    #[test]
    fn test_check_path_rejects_other_paths_with_404() {
        // Act
        let result = check_path(&request("/admin"), Response::new(()), "/ws");

        // Assert
        let reject = result.unwrap_err();
        assert_eq!(reject.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_check_path_ignores_query_string() {
        let result = check_path(&request("/ws?room=1"), Response::new(()), "/ws");
        assert!(result.is_ok());
    }

    #[test]
    fn test_check_path_is_exact() {
        assert!(check_path(&request("/ws/extra"), Response::new(()), "/ws").is_err());
        assert!(check_path(&request("/"), Response::new(()), "/ws").is_err());
    }

    #[tokio::test]
    async fn test_bind_port_zero_reports_real_port() {
        let config = ServerConfig {
            bind: "127.0.0.1".parse().unwrap(),
            port: 0,
            ..ServerConfig::default()
        };

        let server = RelayServer::bind(config).await.unwrap();

        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_ws_path() {
        let config = ServerConfig {
            bind: "127.0.0.1".parse().unwrap(),
            port: 0,
            ws_path: "ws".to_string(),
            ..ServerConfig::default()
        };

        assert!(RelayServer::bind(config).await.is_err());
    }

    #[tokio::test]
    async fn test_run_returns_when_flag_cleared() {
        let config = ServerConfig {
            bind: "127.0.0.1".parse().unwrap(),
            port: 0,
            ..ServerConfig::default()
        };
        let server = RelayServer::bind(config).await.unwrap();
        let running = Arc::new(AtomicBool::new(false));

        let result = timeout(Duration::from_secs(2), server.run(running)).await;

        assert!(matches!(result, Ok(Ok(()))));
    }
}
