//! Progress events — the unit of the streaming contract.

use serde::{Deserialize, Serialize};

use labstream_core::runner::OutputStream;
use labstream_core::types::{OperationId, RunId, Timestamp};

/// Discriminant of a [`ProgressEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// First event of every run; binds the operation id.
    RunStarted,
    /// One human-readable line of job output.
    LogLine,
    /// One self-contained JSON record emitted by the job.
    StructuredOutput,
    /// Terminal: the process could not be spawned.
    RunFailed,
    /// Terminal: the process exited; the exit code is in `data`.
    RunEnded,
}

impl EventKind {
    /// Whether no further events for the run are valid after this one.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::RunFailed | Self::RunEnded)
    }
}

/// One unit of the streaming protocol describing a state change or log
/// output for a run.
///
/// Required fields are always present; everything else is omitted from
/// the wire when unset. For a single run, events are delivered in the
/// order they were produced per output stream; stdout/stderr
/// interleaving is not ordered across streams. Delivery is
/// fire-and-forget: a disconnected subscriber silently loses in-flight
/// events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: RunId,
    pub event_type: EventKind,
    pub timestamp: Timestamp,

    /// Correlation token binding this event stream to one logical run.
    /// Bound at `run-started` and stable for the run's lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<OperationId>,

    /// Which output stream a `log-line` arrived on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<OutputStream>,

    /// Human-readable log or error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Structured payload. May carry `step`, `total_steps`, `exit_code`,
    /// or arbitrary job-specific fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProgressEvent {
    fn base(run_id: RunId, operation_id: OperationId, event_type: EventKind) -> Self {
        Self {
            run_id,
            event_type,
            timestamp: chrono::Utc::now(),
            operation_id: Some(operation_id),
            stream: None,
            message: None,
            data: None,
        }
    }

    /// Build the opening event of a run.
    pub fn run_started(
        run_id: RunId,
        operation_id: OperationId,
        job_id: &str,
        total_steps: Option<u32>,
    ) -> Self {
        let mut data = serde_json::json!({ "job_id": job_id });
        if let Some(total) = total_steps {
            data["total_steps"] = total.into();
        }
        Self {
            data: Some(data),
            ..Self::base(run_id, operation_id, EventKind::RunStarted)
        }
    }

    /// Build a log-line event for one line of output.
    pub fn log_line(
        run_id: RunId,
        operation_id: OperationId,
        stream: OutputStream,
        line: impl Into<String>,
    ) -> Self {
        Self {
            stream: Some(stream),
            message: Some(line.into()),
            ..Self::base(run_id, operation_id, EventKind::LogLine)
        }
    }

    /// Build a structured-output event from a parsed job record.
    pub fn structured_output(
        run_id: RunId,
        operation_id: OperationId,
        record: serde_json::Value,
    ) -> Self {
        Self {
            data: Some(record),
            ..Self::base(run_id, operation_id, EventKind::StructuredOutput)
        }
    }

    /// Build the terminal event of a completed process.
    pub fn run_ended(run_id: RunId, operation_id: OperationId, exit_code: i32) -> Self {
        Self {
            data: Some(serde_json::json!({ "exit_code": exit_code })),
            ..Self::base(run_id, operation_id, EventKind::RunEnded)
        }
    }

    /// Build the terminal event of a run whose process never started.
    pub fn run_failed(run_id: RunId, operation_id: OperationId, error: impl Into<String>) -> Self {
        Self {
            message: Some(error.into()),
            ..Self::base(run_id, operation_id, EventKind::RunFailed)
        }
    }

    /// Whether this event ends its run's stream.
    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }

    /// `data.step`, if present and a non-negative integer.
    pub fn step(&self) -> Option<u64> {
        self.data_u64("step")
    }

    /// `data.total_steps`, if present and a non-negative integer.
    pub fn total_steps(&self) -> Option<u64> {
        self.data_u64("total_steps")
    }

    /// `data.exit_code`, if present.
    pub fn exit_code(&self) -> Option<i32> {
        self.data
            .as_ref()
            .and_then(|d| d.get("exit_code"))
            .and_then(|v| v.as_i64())
            .map(|v| v as i32)
    }

    fn data_u64(&self, key: &str) -> Option<u64> {
        self.data
            .as_ref()
            .and_then(|d| d.get(key))
            .and_then(|v| v.as_u64())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
