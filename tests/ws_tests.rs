//! WebSocket tests over a real socket
//!
//! The relay router is served on an ephemeral port and driven with a
//! tungstenite client, so frames are checked exactly as a browser sees them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use history_relay::bus::MemoryBus;
use history_relay::config::{ConsumerConfig, LiveConfig};
use history_relay::server::Relay;
use history_relay::store::{HistoryStore, MemoryHistoryStore};
use history_relay::ConsumerState;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TOPIC: &str = "classification-results";
const HEARTBEAT: Duration = Duration::from_millis(100);
const WAIT: Duration = Duration::from_secs(2);

struct Server {
    addr: SocketAddr,
    bus: Arc<MemoryBus>,
    store: Arc<MemoryHistoryStore>,
    _shutdown: watch::Sender<bool>,
}

impl Server {
    async fn start() -> Self {
        let bus = Arc::new(MemoryBus::default());
        let store = Arc::new(MemoryHistoryStore::new());

        let base = url::Url::parse("https://docs.example.com/files/").unwrap();
        let live = LiveConfig {
            heartbeat_interval: HEARTBEAT,
            ..LiveConfig::default()
        };
        let relay = Relay::new(
            store.clone(),
            bus.clone(),
            ConsumerConfig::new(base).with_topic(TOPIC),
            &live,
        );

        let mut state = relay.consumer.state();
        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(relay.consumer.run(shutdown_rx));
        tokio::time::timeout(WAIT, state.wait_for(|s| *s == ConsumerState::Consuming))
            .await
            .expect("consumer never subscribed")
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = relay.router;
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            addr,
            bus,
            store,
            _shutdown: shutdown,
        }
    }

    async fn connect(&self) -> Client {
        let (client, _) = connect_async(format!("ws://{}/ws", self.addr)).await.unwrap();
        client
    }

    async fn publish_and_wait(&self, payload: &str, expected: u64) {
        assert_eq!(self.bus.publish(TOPIC, payload), 1);
        tokio::time::timeout(WAIT, async {
            while self.store.count().await.unwrap() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("entry was not stored in time");
    }
}

/// Next raw frame, failing the test if none arrives in time
async fn next_frame(client: &mut Client) -> Message {
    tokio::time::timeout(WAIT, client.next())
        .await
        .expect("no frame in time")
        .expect("socket closed")
        .expect("socket error")
}

/// Next JSON text frame; heartbeat pings are skipped
async fn next_json(client: &mut Client) -> Value {
    loop {
        match next_frame(client).await {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_ws_sends_snapshot_then_update() {
    let server = Server::start().await;
    server
        .publish_and_wait(r#"{"id":"old","timestamp":"2024-01-01T00:00:00Z"}"#, 1)
        .await;

    let mut client = server.connect().await;
    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["data"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["data"][0]["id"], "old");

    server.publish_and_wait(r#"{"id":"new","result":{"ok":true}}"#, 2).await;
    let update = next_json(&mut client).await;
    assert_eq!(update["type"], "update");
    assert_eq!(update["data"]["id"], "new");
    assert_eq!(update["data"]["result"]["ok"], true);
}

#[tokio::test]
async fn test_ws_update_matches_history_read() {
    let server = Server::start().await;
    let mut client = server.connect().await;
    assert_eq!(next_json(&mut client).await["type"], "snapshot");

    server.publish_and_wait(r#"{"id":"now","result":{}}"#, 1).await;
    let update = next_json(&mut client).await;

    let stored = server.store.latest(1).await.unwrap();
    assert_eq!(update["data"], serde_json::to_value(&stored[0]).unwrap());
}

#[tokio::test]
async fn test_ws_answers_client_ping() {
    let server = Server::start().await;
    let mut client = server.connect().await;
    assert_eq!(next_json(&mut client).await["type"], "snapshot");

    client
        .send(Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut client).await, serde_json::json!({"type": "pong"}));
}

#[tokio::test]
async fn test_ws_sends_heartbeat_pings() {
    let server = Server::start().await;
    let mut client = server.connect().await;
    assert_eq!(next_json(&mut client).await["type"], "snapshot");

    match next_frame(&mut client).await {
        Message::Ping(_) => {}
        other => panic!("expected heartbeat ping, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ws_closes_when_snapshot_unavailable() {
    let server = Server::start().await;
    server.store.set_offline(true);

    let mut client = server.connect().await;
    match next_frame(&mut client).await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Error),
        other => panic!("expected close frame, got {:?}", other),
    }
}
