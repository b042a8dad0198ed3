//! Stateful driver owning one [`RunView`].
//!
//! A session guards run starts, feeds incoming events to the view, and
//! releases everything on disposal. It is safe to share behind `Arc`
//! across the task reading the WebSocket and the task triggering runs.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use labstream_core::types::RunId;
use labstream_events::{parse_server_message, ProgressEvent, ServerMessage};

use crate::reducer::RunView;

/// Result of a [`RunSession::start`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The launcher ran and returned this run id.
    Started(RunId),
    /// A run is already active; nothing was launched.
    AlreadyRunning,
}

/// Owns a [`RunView`] and the liveness flag guarding run starts.
pub struct RunSession {
    view: Mutex<RunView>,
    /// Live activity flag. Kept outside the view on purpose: a guard
    /// that closes over a snapshot of view state goes stale across
    /// awaits, and a second `start` racing the first would spawn twice.
    active: AtomicBool,
    cancel: CancellationToken,
    reset_on_start: bool,
}

impl RunSession {
    /// Session that resets its view at every start.
    pub fn new() -> Self {
        Self::with_options(true)
    }

    /// Session with explicit reset-on-start behaviour.
    pub fn with_options(reset_on_start: bool) -> Self {
        Self {
            view: Mutex::new(RunView::new()),
            active: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            reset_on_start,
        }
    }

    /// Whether a run is currently active.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start a run through `launch` unless one is already active.
    ///
    /// The flag flips atomically before anything awaits, so two
    /// overlapping calls can never both launch. If `launch` fails the
    /// flag is released and the error propagated; otherwise it stays set
    /// until a terminal event arrives or the session is disposed.
    pub async fn start<F, Fut, E>(&self, launch: F) -> Result<StartOutcome, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RunId, E>>,
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Run already active; start request ignored");
            return Ok(StartOutcome::AlreadyRunning);
        }

        if self.reset_on_start {
            self.view.lock().await.reset();
        }

        match launch().await {
            Ok(run_id) => Ok(StartOutcome::Started(run_id)),
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Fold one event into the view. No-op after disposal.
    pub async fn handle_event(&self, event: &ProgressEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        let mut view = self.view.lock().await;
        view.apply(event);
        if view.is_terminal() {
            self.active.store(false, Ordering::SeqCst);
        }
    }

    /// Read envelopes off a live WebSocket connection until it closes
    /// or the session is disposed, folding every run event.
    pub async fn process_events(
        &self,
        ws_stream: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Session disposed; event loop stopping");
                    return;
                }
                msg = ws_stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => match parse_server_message(&text) {
                        Ok(ServerMessage::Event(event)) => self.handle_event(&event).await,
                        Ok(ServerMessage::Pong) => {
                            tracing::trace!("Pong received");
                        }
                        Ok(ServerMessage::Welcome { connection_id }) => {
                            // A welcome mid-stream means the server restarted
                            // underneath a reconnect; nothing to fold.
                            tracing::debug!(connection_id = %connection_id, "Welcome received");
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, raw_message = %text, "Unparseable server message");
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Server closed the connection");
                        return;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "WebSocket receive error");
                        return;
                    }
                    None => return,
                }
            }
        }
    }

    /// Current view state, as a copy.
    pub async fn snapshot(&self) -> RunView {
        self.view.lock().await.clone()
    }

    /// Release the event subscription. After this no event mutates the
    /// view, and `process_events` loops return.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }
}

impl Default for RunSession {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
