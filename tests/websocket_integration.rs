//! WebSocket integration tests.
//!
//! These tests serve the router on a local port and follow a poll's live
//! stream with a real WebSocket client.

use std::time::Duration;

use futures_util::StreamExt;
use live_poll::api::{create_router_with_state, AppState};
use live_poll::{NewSession, SessionRegistry, VoteMode};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Serve the API on an ephemeral port and return its base address.
async fn boot_server(registry: SessionRegistry) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = create_router_with_state(AppState::new(registry));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{addr}")
}

async fn connect(base: &str, poll_id: &str) -> WsStream {
    let url = format!("{base}/api/v1/polls/{poll_id}/ws");
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Read the next text frame as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Wait until the server ends the stream.
async fn expect_end(ws: &mut WsStream) {
    loop {
        match timeout(TIMEOUT, ws.next()).await.expect("timeout waiting for close") {
            None | Some(Ok(Message::Close(_))) | Some(Err(_)) => return,
            Some(Ok(Message::Text(text))) => panic!("unexpected frame: {text}"),
            Some(Ok(_)) => {}
        }
    }
}

fn colours(mode: VoteMode) -> NewSession {
    NewSession::new("Favourite colour?", mode, ["red", "blue", "green"])
}

// ============================================================================
// Live Stream Tests
// ============================================================================

#[tokio::test]
async fn test_stream_init_update_closed() {
    let registry = SessionRegistry::in_memory();
    let base = boot_server(registry.clone()).await;
    let session = registry.create(colours(VoteMode::Single)).await.unwrap();
    let handle = registry.coordinator(session.id).unwrap();

    let mut ws = connect(&base, &session.id.to_string()).await;

    let init = read_json(&mut ws).await;
    assert_eq!(init["event"], "init");
    assert_eq!(init["data"]["id"], session.id.to_string());
    assert_eq!(init["data"]["prompt"], "Favourite colour?");
    assert_eq!(init["data"]["options"].as_array().unwrap().len(), 3);

    handle
        .submit_vote(vec!["2".to_string()], "voter-a")
        .await
        .unwrap();
    let update = read_json(&mut ws).await;
    assert_eq!(update["event"], "update");
    assert_eq!(update["data"][1]["id"], "2");
    assert_eq!(update["data"][1]["vote_count"], 1);

    handle
        .submit_vote(vec!["2".to_string()], "voter-b")
        .await
        .unwrap();
    let update = read_json(&mut ws).await;
    assert_eq!(update["data"][1]["vote_count"], 2);

    handle.close().await.unwrap();
    let closed = read_json(&mut ws).await;
    assert_eq!(closed["event"], "closed");
    assert_eq!(closed["data"]["message"], "voting has ended");
    assert!(closed["data"]["closed_at"].is_string());
}

#[tokio::test]
async fn test_each_client_gets_every_update() {
    let registry = SessionRegistry::in_memory();
    let base = boot_server(registry.clone()).await;
    let session = registry.create(colours(VoteMode::Multiple)).await.unwrap();
    let handle = registry.coordinator(session.id).unwrap();
    let poll_id = session.id.to_string();

    let mut first = connect(&base, &poll_id).await;
    let mut second = connect(&base, &poll_id).await;
    assert_eq!(read_json(&mut first).await["event"], "init");
    assert_eq!(read_json(&mut second).await["event"], "init");

    handle
        .submit_vote(vec!["1".to_string(), "3".to_string()], "voter-a")
        .await
        .unwrap();

    for ws in [&mut first, &mut second] {
        let update = read_json(ws).await;
        assert_eq!(update["event"], "update");
        assert_eq!(update["data"][0]["vote_count"], 1);
        assert_eq!(update["data"][2]["vote_count"], 1);
    }
}

#[tokio::test]
async fn test_expiry_ends_stream() {
    let registry = SessionRegistry::in_memory();
    let base = boot_server(registry.clone()).await;
    let session = registry.create(colours(VoteMode::Single)).await.unwrap();
    let handle = registry.coordinator(session.id).unwrap();

    let mut ws = connect(&base, &session.id.to_string()).await;
    assert_eq!(read_json(&mut ws).await["event"], "init");

    handle.expire().await.unwrap();
    expect_end(&mut ws).await;
}

// ============================================================================
// Error Frame Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_poll_gets_error_frame() {
    let registry = SessionRegistry::in_memory();
    let base = boot_server(registry).await;

    let mut ws = connect(&base, &live_poll::SessionId::new().to_string()).await;
    let frame = read_json(&mut ws).await;
    assert_eq!(frame["event"], "error");
    assert_eq!(frame["data"]["code"], "SESSION_NOT_FOUND");
    expect_end(&mut ws).await;
}

#[tokio::test]
async fn test_malformed_poll_id_gets_error_frame() {
    let registry = SessionRegistry::in_memory();
    let base = boot_server(registry).await;

    let mut ws = connect(&base, "not-a-uuid").await;
    let frame = read_json(&mut ws).await;
    assert_eq!(frame["event"], "error");
    assert_eq!(frame["data"]["code"], "INVALID_SESSION_ID");
    expect_end(&mut ws).await;
}
