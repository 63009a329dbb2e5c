//! WebSocket handler for live poll updates.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use super::handlers::AppState;
use super::types::ErrorResponse;
use crate::broadcast::BroadcastMessage;
use crate::error::PollError;
use crate::session::SessionId;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

/// Serialize a broadcast as a text frame.
fn broadcast_frame(message: &BroadcastMessage) -> Option<Message> {
    serde_json::to_string(message)
        .ok()
        .map(|json| Message::Text(json.into()))
}

/// Serialize an error as a text frame.
fn error_frame(err: &PollError) -> Option<Message> {
    let payload = serde_json::json!({
        "event": "error",
        "data": ErrorResponse::from(err),
    });
    serde_json::to_string(&payload)
        .ok()
        .map(|json| Message::Text(json.into()))
}

/// Forward the session's broadcasts to the socket until either side ends.
async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let (mut sink, mut stream) = socket.split();

    let subscribed = match session_id.parse::<SessionId>() {
        Ok(id) => match state.registry.coordinator(id) {
            Ok(handle) => handle.subscribe().await,
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    let mut subscription = match subscribed {
        Ok(sub) => sub,
        Err(e) => {
            if let Some(frame) = error_frame(&e) {
                let _ = sink.send(frame).await;
            }
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };
    tracing::debug!(session = %session_id, subscriber = subscription.id(), "stream opened");

    loop {
        tokio::select! {
            message = subscription.recv() => {
                let Some(message) = message else {
                    // Session expired.
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let Some(frame) = broadcast_frame(&message) else {
                    continue;
                };
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    // Dropping the subscription lets the broadcaster prune it on its next publish.
    tracing::debug!(session = %session_id, subscriber = subscription.id(), "stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ClosedNotice;

    #[test]
    fn test_broadcast_frame_shape() {
        let msg = BroadcastMessage::Closed(ClosedNotice {
            message: "voting has ended".into(),
            closed_at: None,
        });
        match broadcast_frame(&msg) {
            Some(Message::Text(text)) => {
                let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(json["event"], "closed");
            }
            other => panic!("Expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_error_frame_shape() {
        match error_frame(&PollError::NotFound("abc".into())) {
            Some(Message::Text(text)) => {
                let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(json["event"], "error");
                assert_eq!(json["data"]["code"], "SESSION_NOT_FOUND");
            }
            other => panic!("Expected text frame, got {:?}", other),
        }
    }
}
