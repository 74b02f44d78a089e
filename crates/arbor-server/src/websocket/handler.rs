//! WebSocket upgrade and the per-connection request loop.
//!
//! Each connection runs a writer task draining its outbound channel, a
//! reader loop decoding `RpcRequest` frames and dispatching them, and — once
//! the client binds to a session — a forwarder task bridging that session's
//! notification-bus deliveries into the outbound channel.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use arbor_rpc::{RpcRequest, RpcResponse, dispatch};
use arbor_runtime::Delivery;

use crate::server::AppState;
use crate::websocket::connection::ClientConnection;

/// Frames queued per connection before sends are rejected.
const OUTBOUND_CAPACITY: usize = 512;

/// Handle `GET /ws`.
pub async fn ws_upgrade(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
    let connection = Arc::new(ClientConnection::new(
        Uuid::now_v7().to_string(),
        outbound_tx,
    ));
    debug!(conn_id = %connection.id, "websocket connected");

    // Writer: drain the outbound channel into the socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_tx.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // Forwarder slot: replaced when the client binds to another session.
    let mut forwarder: Option<tokio::task::JoinHandle<()>> = None;

    while let Some(frame) = ws_rx.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let request: RpcRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                let response = RpcResponse {
                    id: String::new(),
                    result: None,
                    error: Some(arbor_rpc::RpcErrorBody {
                        code: "INVALID_PARAMS".into(),
                        message: format!("malformed request frame: {e}"),
                    }),
                };
                send_json(&connection, &response);
                continue;
            }
        };

        let bind_target = session_binding(&request);
        let response = dispatch(&state.rpc, request).await;

        // Successful session-scoped calls bind the connection and start
        // forwarding that session's live events.
        if response.error.is_none() {
            if let Some(session_id) = bind_target {
                connection.bind_session(session_id.clone());
                if let Some(old) = forwarder.take() {
                    old.abort();
                }
                forwarder = spawn_forwarder(&state, &connection, &session_id);
            }
        }

        send_json(&connection, &response);
    }

    if let Some(task) = forwarder {
        task.abort();
    }
    writer.abort();
    debug!(conn_id = %connection.id, "websocket disconnected");
}

/// Which session a successful call should bind the connection to.
fn session_binding(request: &RpcRequest) -> Option<String> {
    match request.method.as_str() {
        "session.resume" | "turn.start" => request
            .params
            .as_ref()?
            .get("sessionId")?
            .as_str()
            .map(str::to_owned),
        _ => None,
    }
}

fn spawn_forwarder(
    state: &AppState,
    connection: &Arc<ClientConnection>,
    session_id: &str,
) -> Option<tokio::task::JoinHandle<()>> {
    let (mut subscription, head) = match state.rpc.sessions.subscribe(session_id) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(session_id, error = %e, "subscribe failed");
            return None;
        }
    };

    // Tell the client where live coverage begins so it can page history.
    let hello = json!({
        "type": "subscription.ready",
        "sessionId": session_id,
        "headEventId": head,
    });
    let _ = connection.send(hello.to_string());

    let connection = connection.clone();
    let session_id = session_id.to_owned();
    Some(tokio::spawn(async move {
        loop {
            match subscription.recv().await {
                Delivery::Event(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(_) => continue,
                    };
                    if !connection.send(frame) {
                        warn!(session_id, conn_id = %connection.id, "client too slow, frame dropped");
                    }
                }
                Delivery::Dropped { count } => {
                    let notice = json!({
                        "type": "subscription.lagged",
                        "sessionId": session_id,
                        "dropped": count,
                    });
                    let _ = connection.send(notice.to_string());
                }
            }
        }
    }))
}

fn send_json<T: serde::Serialize>(connection: &Arc<ClientConnection>, value: &T) {
    if let Ok(frame) = serde_json::to_string(value) {
        let _ = connection.send(frame);
    }
}
