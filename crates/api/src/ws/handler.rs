use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use labstream_events::{parse_client_message, ClientMessage, ServerMessage};

use crate::state::AppState;
use crate::ws::registry::ConnectionRegistry;

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with
/// [`ConnectionRegistry`] and managed by two tasks (sender + receiver).
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.registry))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection and pushes a `welcome` envelope carrying
///      the new identity through its own channel, so the client learns the
///      id before any run event can reach it.
///   2. Spawns a sender task that forwards channel messages to the sink.
///   3. Processes inbound messages on the current task.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, registry: Arc<ConnectionRegistry>) {
    let (conn_id, mut rx) = registry.register().await;
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    send_envelope(
        &registry,
        &conn_id,
        ServerMessage::Welcome {
            connection_id: conn_id.clone(),
        },
    )
    .await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Receiver loop: process inbound messages. Transport errors stop the
    // loop and remove the connection; they never propagate further.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) => match parse_client_message(&text) {
                Ok(ClientMessage::Ping) => {
                    send_envelope(&registry, &conn_id, ServerMessage::Pong).await;
                }
                Err(e) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Unparseable client message");
                }
            },
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_msg) => {
                // Binary and protocol-level Ping frames carry nothing we act on.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: remove connection and abort sender task.
    registry.unregister(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Serialize an envelope and push it through the connection's channel.
///
/// A missing connection or closed channel is ignored: the peer is gone
/// and cleanup happens in the handler loop.
async fn send_envelope(registry: &ConnectionRegistry, conn_id: &str, msg: ServerMessage) {
    let text = match serde_json::to_string(&msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server message");
            return;
        }
    };
    if let Some(sender) = registry.lookup(conn_id).await {
        let _ = sender.send(Message::Text(text.into()));
    }
}
