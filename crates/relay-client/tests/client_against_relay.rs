//! Runs the demo client against a real relay and watches what it publishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use relay_client::{parse_state, run, ClientConfig, ClientError, FULL_HEALTH, WORLD_SIZE};
use relay_server::domain::ServerConfig;
use relay_server::infrastructure::RelayServer;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

#[tokio::test]
async fn test_client_updates_reach_an_observer() {
    // Arrange: a relay on a free port and one passive observer.
    let server = RelayServer::bind(ServerConfig {
        bind: "127.0.0.1".parse().unwrap(),
        port: 0,
        status_interval_secs: 0,
        ..ServerConfig::default()
    })
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let router = server.router();
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(server.run(Arc::clone(&running)));

    let url = format!("ws://{addr}/ws");
    let (mut observer, _) = connect_async(url.as_str()).await.unwrap();
    for _ in 0..200 {
        if router.session_count().await.unwrap() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Act
    let config = ClientConfig {
        url,
        username: "Ann".to_string(),
        interval: Duration::from_millis(20),
        max_updates: Some(3),
    };
    timeout(Duration::from_secs(5), run(config))
        .await
        .unwrap()
        .unwrap();

    // Assert
    let mut received = Vec::new();
    while received.len() < 3 {
        let frame = timeout(Duration::from_secs(2), observer.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let WsMessage::Text(text) = frame {
            if let Some(update) = parse_state(&text).unwrap() {
                received.push(update);
            }
        }
    }
    assert!(received.iter().all(|u| u.health == FULL_HEALTH));
    assert!(received
        .iter()
        .all(|u| (0..WORLD_SIZE).contains(&u.position.x) && (0..WORLD_SIZE).contains(&u.position.y)));
    assert!(received.windows(2).all(|w| w[0].session_id == w[1].session_id));

    running.store(false, Ordering::Relaxed);
}

#[tokio::test]
async fn test_unreachable_relay_is_connect_error() {
    // Bind then drop a listener so the port is known to be closed.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig {
        url: format!("ws://{addr}/ws"),
        ..ClientConfig::default()
    };

    let result = run(config).await;

    assert!(matches!(result, Err(ClientError::Connect { .. })));
}
