//! End-to-end tests over real WebSocket connections.
//!
//! Each test starts one or more full server instances against a shared
//! in-memory store, which stands in for the Redis every production
//! instance points at. Two instances over one store must behave as one
//! logical room without sharing any other state.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use banter::protocol::{ClientFrame, ServerFrame};
use banter::store::MemoryStore;
use banter::{Message, RelayConfig, RelayServer};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a full server instance over the shared store, return its port.
async fn start_instance(store: Arc<MemoryStore>) -> u16 {
    let port = free_port().await;
    let config = RelayConfig {
        port,
        ..RelayConfig::default()
    };
    let server = RelayServer::with_store(config, store);
    tokio::spawn(async move {
        server.start().await.unwrap();
    });
    // Give the server time to bind and the relay time to subscribe
    tokio::time::sleep(Duration::from_millis(100)).await;
    port
}

/// Connect a client and consume the initial history frame.
async fn connect(port: u16) -> (WsClient, String) {
    let url = format!("ws://127.0.0.1:{port}/ws");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let history = match next_frame(&mut ws).await {
        ServerFrame::History(batch) => batch,
        other => panic!("expected history first, got {other:?}"),
    };
    (ws, history)
}

/// Read the next protocol frame, skipping transport-level noise.
async fn next_frame(ws: &mut WsClient) -> ServerFrame {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .expect("websocket error");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).expect("bad server frame");
        }
    }
}

async fn next_chat(ws: &mut WsClient) -> Message {
    match next_frame(ws).await {
        ServerFrame::Chat(msg) => msg,
        other => panic!("expected chat frame, got {other:?}"),
    }
}

async fn send_chat(ws: &mut WsClient, author: &str, text: &str) {
    let frame = ClientFrame::Chat(Message::new(author, text));
    ws.send(WsMessage::Text(serde_json::to_string(&frame).unwrap()))
        .await
        .unwrap();
}

/// Assert nothing further arrives on this connection for a short while.
async fn assert_silent(ws: &mut WsClient) {
    let quiet = timeout(Duration::from_millis(300), ws.next()).await;
    assert!(quiet.is_err(), "expected no further frames, got {quiet:?}");
}

#[tokio::test]
async fn test_status_endpoint_returns_ok() {
    let port = start_instance(Arc::new(MemoryStore::new())).await;
    let body = reqwest::get(format!("http://127.0.0.1:{port}/status"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_sender_sees_own_message_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let port = start_instance(store).await;
    let (mut alice, history) = connect(port).await;
    assert_eq!(history, "");

    send_chat(&mut alice, "alice", "hi").await;

    let echo = next_chat(&mut alice).await;
    assert_eq!(echo.author, "alice");
    assert_eq!(echo.text, "hi");

    // The relay observes this instance's own announcement too; it must not
    // produce a second copy.
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn test_same_process_peers_receive_once() {
    let store = Arc::new(MemoryStore::new());
    let port = start_instance(store).await;
    let (mut alice, _) = connect(port).await;
    let (mut bob, _) = connect(port).await;

    send_chat(&mut alice, "alice", "hello bob").await;

    let received = next_chat(&mut bob).await;
    assert_eq!(received.text, "hello bob");
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_cross_instance_delivery() {
    let store = Arc::new(MemoryStore::new());
    let port_a = start_instance(store.clone()).await;
    let port_b = start_instance(store).await;

    let (mut alice, _) = connect(port_a).await;
    let (mut bob, _) = connect(port_b).await;

    send_chat(&mut alice, "alice", "across the wire").await;

    // Bob's instance shares nothing with Alice's except the store
    let received = next_chat(&mut bob).await;
    assert_eq!(received.author, "alice");
    assert_eq!(received.text, "across the wire");
    assert_silent(&mut bob).await;

    // And Alice still got exactly her one echo
    let echo = next_chat(&mut alice).await;
    assert_eq!(echo.text, "across the wire");
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn test_late_joiner_receives_history() {
    let store = Arc::new(MemoryStore::new());
    let port = start_instance(store).await;
    let (mut alice, _) = connect(port).await;

    send_chat(&mut alice, "alice", "first").await;
    send_chat(&mut alice, "alice", "second").await;
    let _ = next_chat(&mut alice).await;
    let _ = next_chat(&mut alice).await;
    // Let the publisher finish the durable writes
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (_bob, history) = connect(port).await;
    let texts: Vec<String> = history
        .lines()
        .map(|line| Message::from_json(line).unwrap().text)
        .collect();
    assert_eq!(texts, vec!["first", "second"]);
}

#[tokio::test]
async fn test_history_spans_instances() {
    let store = Arc::new(MemoryStore::new());
    let port_a = start_instance(store.clone()).await;
    let port_b = start_instance(store).await;

    let (mut alice, _) = connect(port_a).await;
    send_chat(&mut alice, "alice", "logged on a").await;
    let _ = next_chat(&mut alice).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Joining through the other instance replays the same record
    let (_bob, history) = connect(port_b).await;
    assert!(history.contains("logged on a"));
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let store = Arc::new(MemoryStore::new());
    let port = start_instance(store).await;
    let (mut alice, _) = connect(port).await;

    alice
        .send(WsMessage::Text("this is not a frame".to_string()))
        .await
        .unwrap();

    // The bad frame is dropped; the connection still works
    send_chat(&mut alice, "alice", "still here").await;
    let echo = next_chat(&mut alice).await;
    assert_eq!(echo.text, "still here");
}

#[tokio::test]
async fn test_store_outage_degrades_to_local_delivery() {
    let store = Arc::new(MemoryStore::new());
    let port = start_instance(store.clone()).await;
    let (mut alice, _) = connect(port).await;
    let (mut bob, _) = connect(port).await;

    store.set_append_outage(true);
    send_chat(&mut alice, "alice", "during outage").await;

    // Local delivery still happens on both paths
    assert_eq!(next_chat(&mut alice).await.text, "during outage");
    assert_eq!(next_chat(&mut bob).await.text, "during outage");

    // But nothing was recorded, so a late joiner sees no history
    tokio::time::sleep(Duration::from_millis(200)).await;
    store.set_append_outage(false);
    let (_carol, history) = connect(port).await;
    assert_eq!(history, "");
}

#[tokio::test]
async fn test_disconnect_leaves_peers_unaffected() {
    let store = Arc::new(MemoryStore::new());
    let port = start_instance(store).await;
    let (alice, _) = connect(port).await;
    let (mut bob, _) = connect(port).await;
    let (mut carol, _) = connect(port).await;

    drop(alice); // abrupt disconnect

    send_chat(&mut bob, "bob", "anyone there").await;
    assert_eq!(next_chat(&mut bob).await.text, "anyone there");
    assert_eq!(next_chat(&mut carol).await.text, "anyone there");
}
