use std::sync::Arc;

use labstream_core::history::RunHistory;

use crate::config::ServerConfig;
use crate::orchestrator::RunOrchestrator;
use crate::ws::ConnectionRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection registry (console clients).
    pub registry: Arc<ConnectionRegistry>,
    /// Run orchestrator: spawns jobs and streams their progress.
    pub orchestrator: Arc<RunOrchestrator>,
    /// Bounded newest-first cache of terminal runs.
    pub history: Arc<RunHistory>,
}
