//! Central run orchestrator service.
//!
//! Coordinates connection lookup, job resolution, process spawning, and
//! live event emission. Held in [`AppState`](crate::state::AppState) as an
//! `Arc<RunOrchestrator>`.
//!
//! Each run drives the full lifecycle:
//! 1. Resolve the addressed connection in the registry.
//! 2. Resolve the job id through the catalog.
//! 3. Return a fresh run id to the caller immediately.
//! 4. In a detached task: emit `run-started`, spawn the process, classify
//!    and stream each output line, and finish with exactly one terminal
//!    event after recording the run in history.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio_util::sync::CancellationToken;

use labstream_core::history::RunHistory;
use labstream_core::job::{JobCatalog, JobSpec};
use labstream_core::run::Run;
use labstream_core::runner::{self, OutputLine, OutputStream};
use labstream_core::types::{ConnectionId, OperationId, RunId};
use labstream_events::{ProgressEvent, ServerMessage};

use crate::ws::registry::WsSender;
use crate::ws::ConnectionRegistry;

/// Errors that reject a run request before anything is spawned.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The addressed identity has no live connection.
    #[error("No live connection with id {0}")]
    ConnectionNotFound(ConnectionId),

    /// The job id does not resolve to an executable descriptor.
    #[error("Job '{0}' not found")]
    JobNotFound(String),
}

/// Spawns external jobs and streams their progress to one addressed
/// connection per run.
///
/// Runs share no mutable state with each other; the registry and the
/// history cache are the only shared structures and both are
/// interior-locked. One detached task per run, so no run's event
/// emission blocks another's.
pub struct RunOrchestrator {
    registry: Arc<ConnectionRegistry>,
    catalog: Arc<dyn JobCatalog>,
    history: Arc<RunHistory>,
    /// Master cancellation token -- cancelled during shutdown. Each run
    /// task holds a child token; nothing else cancels a run in flight.
    cancel: CancellationToken,
}

impl RunOrchestrator {
    /// Create an orchestrator over the given registry, catalog and history.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        catalog: Arc<dyn JobCatalog>,
        history: Arc<RunHistory>,
    ) -> Self {
        Self {
            registry,
            catalog,
            history,
            cancel: CancellationToken::new(),
        }
    }

    /// Start a run of `job_id` addressed to `connection_id`.
    ///
    /// Fails fast with [`OrchestratorError`] if the connection or the job
    /// cannot be resolved -- in that case no process is spawned and no
    /// history is written. On success the fresh run id is returned to the
    /// caller synchronously while events begin flowing to the addressed
    /// connection from a detached task.
    pub async fn start_run(
        &self,
        connection_id: &str,
        job_id: &str,
        parameters: serde_json::Map<String, serde_json::Value>,
    ) -> Result<RunId, OrchestratorError> {
        let sender = self
            .registry
            .lookup(connection_id)
            .await
            .ok_or_else(|| OrchestratorError::ConnectionNotFound(connection_id.to_string()))?;

        let spec = self
            .catalog
            .resolve(job_id)
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;

        let run_id = uuid::Uuid::new_v4();
        let operation_id = uuid::Uuid::new_v4();
        let run = Run::new(run_id, job_id, parameters);

        tracing::info!(
            run_id = %run_id,
            job_id = %job_id,
            conn_id = %connection_id,
            "Run requested",
        );

        let history = Arc::clone(&self.history);
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            drive_run(spec, run, operation_id, sender, history, cancel).await;
        });

        Ok(run_id)
    }

    /// Cancel every in-flight run task. Used during graceful shutdown;
    /// spawned processes are killed and no terminal events are emitted.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Drive one run to completion: spawn, stream, finalize.
///
/// Emits `run-started` first, then one event per output line, then
/// exactly one terminal event. The history entry is recorded before the
/// terminal event is sent, so a subscriber that sees the terminal event
/// can immediately read a consistent history.
async fn drive_run(
    spec: JobSpec,
    mut run: Run,
    operation_id: OperationId,
    sender: WsSender,
    history: Arc<RunHistory>,
    cancel: CancellationToken,
) {
    let run_id = run.id;

    send_event(
        &sender,
        ProgressEvent::run_started(run_id, operation_id, &spec.id, spec.total_steps),
    );

    let env_vars = vec![
        ("LABSTREAM_RUN_ID".to_string(), run_id.to_string()),
        ("LABSTREAM_JOB_ID".to_string(), spec.id.clone()),
    ];
    let payload = serde_json::Value::Object(run.parameters.clone());

    let mut job = match runner::spawn_streaming(&spec, env_vars, payload).await {
        Ok(job) => job,
        Err(e) => {
            tracing::warn!(run_id = %run_id, job_id = %spec.id, error = %e, "Spawn failed");
            let message = e.to_string();
            run.fail_to_spawn(&message);
            history.record(run.into_history_entry()).await;
            send_event(&sender, ProgressEvent::run_failed(run_id, operation_id, message));
            return;
        }
    };

    run.mark_running();
    let mut capture_full = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Shutdown: dropping the job kills the process; the
                // subscriber is going away with the server.
                tracing::info!(run_id = %run_id, "Run task cancelled");
                return;
            }
            line = job.next_line() => match line {
                Some(line) => {
                    let event = fold_line(&mut run, &mut capture_full, line, operation_id);
                    send_event(&sender, event);
                }
                None => break,
            }
        }
    }

    let exit_code = match job.wait().await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(run_id = %run_id, error = %e, "Failed to reap job process");
            -1
        }
    };

    run.finish(exit_code);
    tracing::info!(
        run_id = %run_id,
        job_id = %spec.id,
        exit_code,
        success = exit_code == 0,
        "Run finished",
    );

    history.record(run.into_history_entry()).await;
    send_event(&sender, ProgressEvent::run_ended(run_id, operation_id, exit_code));
}

/// Accumulate one output line into the run record and classify it into
/// a progress event.
///
/// Stdout lines that parse as one self-contained JSON object become
/// `structured-output`; anything else is a `log-line`. Stderr lines are
/// always log lines tagged with their stream. Classification failure is
/// expected for ordinary log text and must never fail the pipeline.
fn fold_line(
    run: &mut Run,
    capture_full: &mut bool,
    line: OutputLine,
    operation_id: OperationId,
) -> ProgressEvent {
    let captured = match line.stream {
        OutputStream::Stdout => run.push_stdout(&line.line),
        OutputStream::Stderr => run.push_stderr(&line.line),
    };
    if !captured && !*capture_full {
        *capture_full = true;
        tracing::warn!(run_id = %run.id, "Output capture limit reached; further lines stream only");
    }

    match line.stream {
        OutputStream::Stdout => match serde_json::from_str::<serde_json::Value>(&line.line) {
            Ok(record @ serde_json::Value::Object(_)) => {
                ProgressEvent::structured_output(run.id, operation_id, record)
            }
            _ => ProgressEvent::log_line(run.id, operation_id, OutputStream::Stdout, line.line),
        },
        OutputStream::Stderr => {
            ProgressEvent::log_line(run.id, operation_id, OutputStream::Stderr, line.line)
        }
    }
}

/// Serialize an event and push it to the addressed connection.
///
/// Delivery is fire-and-forget: a closed channel means the subscriber
/// disconnected, and in-flight events for it are silently dropped.
fn send_event(sender: &WsSender, event: ProgressEvent) {
    match serde_json::to_string(&ServerMessage::Event(event)) {
        Ok(text) => {
            let _ = sender.send(Message::Text(text.into()));
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize progress event");
        }
    }
}
