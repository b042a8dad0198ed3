pub mod health;
pub mod runs;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws               WebSocket (progress event stream)
/// /runs             start a run (POST)
/// /runs/history     recent terminal runs, newest first (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .merge(runs::router())
}
