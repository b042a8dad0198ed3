//! WebSocket client for connecting to a labstream server.
//!
//! [`ConsoleClient`] holds the connection configuration. Call
//! [`ConsoleClient::connect`] to establish a live [`ConsoleConnection`],
//! which completes the welcome handshake and learns the server-assigned
//! connection identity.

use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

use labstream_core::types::ConnectionId;
use labstream_events::{parse_server_message, ServerMessage};

/// Configuration handle for one labstream server.
pub struct ConsoleClient {
    ws_url: String,
}

/// A live WebSocket connection to a labstream server.
///
/// Holds the raw stream plus the identity that run requests must present
/// to address events at this connection.
pub struct ConsoleConnection {
    /// Server-assigned identity, delivered in the welcome message.
    pub connection_id: ConnectionId,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ConsoleClient {
    /// Create a client targeting a server.
    ///
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:3000`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    /// WebSocket base URL (e.g. `ws://host:3000`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Connect and complete the welcome handshake.
    ///
    /// The server sends `welcome` as the first text frame on every new
    /// connection; any connection that closes before delivering one is a
    /// handshake failure.
    pub async fn connect(&self) -> Result<ConsoleConnection, ConsoleClientError> {
        let url = format!("{}/api/v1/ws", self.ws_url);

        let (mut ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ConsoleClientError::Connection(format!(
                "Failed to connect to labstream at {}: {e}",
                self.ws_url
            ))
        })?;

        let connection_id = loop {
            match ws_stream.next().await {
                Some(Ok(Message::Text(text))) => match parse_server_message(&text) {
                    Ok(ServerMessage::Welcome { connection_id }) => break connection_id,
                    Ok(other) => {
                        return Err(ConsoleClientError::Handshake(format!(
                            "Expected welcome, got {other:?}"
                        )))
                    }
                    Err(e) => {
                        return Err(ConsoleClientError::Handshake(format!(
                            "Unparseable welcome frame: {e}"
                        )))
                    }
                },
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(other)) => {
                    return Err(ConsoleClientError::Handshake(format!(
                        "Unexpected frame before welcome: {other:?}"
                    )))
                }
                Some(Err(e)) => {
                    return Err(ConsoleClientError::Connection(format!(
                        "Connection failed during handshake: {e}"
                    )))
                }
                None => {
                    return Err(ConsoleClientError::Handshake(
                        "Connection closed before welcome".to_string(),
                    ))
                }
            }
        };

        tracing::info!(
            connection_id = %connection_id,
            "Connected to labstream at {}",
            self.ws_url,
        );

        Ok(ConsoleConnection {
            connection_id,
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connection opened but the welcome handshake failed.
    #[error("Handshake error: {0}")]
    Handshake(String),
}
