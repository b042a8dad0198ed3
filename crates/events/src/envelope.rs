//! WebSocket envelopes wrapping the progress-event stream.
//!
//! Both directions use JSON with the shape `{"type": "<kind>", "data":
//! {...}}`, deserialized into internally-tagged enums.

use serde::{Deserialize, Serialize};

use labstream_core::types::ConnectionId;

use crate::event::ProgressEvent;

/// Messages the server sends over a console connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every new connection; carries the identity the
    /// client must present when requesting runs.
    Welcome { connection_id: ConnectionId },

    /// Reply to a client [`ClientMessage::Ping`].
    Pong,

    /// One progress event for a run addressed to this connection.
    Event(ProgressEvent),
}

/// Messages a console client sends to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Application-level keep-alive. The server answers with `pong`;
    /// a missing answer is not fatal.
    Ping,
}

/// Parse a server-to-client text frame.
///
/// Returns `Err` for malformed JSON or unknown `type` values. Callers
/// should log unknown types and continue.
pub fn parse_server_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Parse a client-to-server text frame.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn parse_welcome() {
        let json = r#"{"type":"welcome","data":{"connection_id":"abc-123"}}"#;
        let msg = parse_server_message(json).expect("parse");
        match msg {
            ServerMessage::Welcome { connection_id } => {
                assert_eq!(connection_id, "abc-123");
            }
            other => panic!("Expected Welcome, got {other:?}"),
        }
    }

    #[test]
    fn parse_pong() {
        let json = r#"{"type":"pong"}"#;
        let msg = parse_server_message(json).expect("parse");
        assert!(matches!(msg, ServerMessage::Pong));
    }

    #[test]
    fn parse_event_envelope() {
        let run_id = uuid::Uuid::new_v4();
        let op_id = uuid::Uuid::new_v4();
        let ev = ProgressEvent::run_started(run_id, op_id, "smoke", None);
        let json = serde_json::to_string(&ServerMessage::Event(ev)).expect("serialize");

        let msg = parse_server_message(&json).expect("parse");
        match msg {
            ServerMessage::Event(ev) => {
                assert_eq!(ev.run_id, run_id);
                assert_eq!(ev.event_type, EventKind::RunStarted);
            }
            other => panic!("Expected Event, got {other:?}"),
        }
    }

    #[test]
    fn parse_ping() {
        let json = r#"{"type":"ping"}"#;
        let msg = parse_client_message(json).expect("parse");
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn welcome_serializes_with_type_tag() {
        let msg = ServerMessage::Welcome {
            connection_id: "c-1".to_string(),
        };
        let json = serde_json::to_string(&msg).expect("serialize");
        assert!(json.contains(r#""type":"welcome""#));
        assert!(json.contains(r#""connection_id":"c-1""#));
    }

    #[test]
    fn parse_unknown_type_returns_error() {
        assert!(parse_server_message(r#"{"type":"mystery","data":{}}"#).is_err());
        assert!(parse_client_message(r#"{"type":"mystery"}"#).is_err());
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        assert!(parse_server_message("not json at all").is_err());
    }
}
