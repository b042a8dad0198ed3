use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use labstream_core::run::RunHistoryEntry;
use labstream_core::types::RunId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for starting a run.
#[derive(Debug, Deserialize, Validate)]
pub struct StartRunRequest {
    /// Identity of the connection the event stream is addressed to,
    /// as delivered in that connection's `welcome` message.
    #[validate(length(min = 1, max = 128))]
    pub connection_id: String,
    /// Job to run, resolved through the catalog.
    #[validate(length(min = 1, max = 128))]
    pub job_id: String,
    /// Named run parameters, piped to the job as JSON.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

/// Response body for a started run.
#[derive(Debug, Serialize)]
pub struct StartRunResponse {
    pub run_id: RunId,
}

/// POST /runs -- start a run and return its id.
///
/// The run id is returned synchronously; progress arrives on the
/// addressed WebSocket connection, not in this response.
async fn start_run(
    State(state): State<AppState>,
    Json(req): Json<StartRunRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let run_id = state
        .orchestrator
        .start_run(&req.connection_id, &req.job_id, req.parameters)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: StartRunResponse { run_id },
        }),
    ))
}

/// GET /runs/history -- recent terminal runs, newest first.
async fn history(State(state): State<AppState>) -> Json<DataResponse<Vec<RunHistoryEntry>>> {
    Json(DataResponse {
        data: state.history.list().await,
    })
}

/// Mount run routes under `/api/v1`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/runs", post(start_run))
        .route("/runs/history", get(history))
}
