//! Progress-event wire protocol shared by the server and console clients.
//!
//! Provides the [`ProgressEvent`](event::ProgressEvent) schema, the
//! WebSocket envelopes wrapping it, and the parsers both sides use.
//! Sequencing rules are documented on the types: per run, events arrive
//! in production order per output stream; exactly one terminal event per
//! started run; fire-and-forget delivery with no redelivery or acks.

pub mod envelope;
pub mod event;

pub use envelope::{parse_client_message, parse_server_message, ClientMessage, ServerMessage};
pub use event::{EventKind, ProgressEvent};
