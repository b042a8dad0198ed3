//! Run lifecycle types.
//!
//! A [`Run`] is created when a run is requested, mutated only by the
//! orchestrator while the spawned process emits output, and frozen into a
//! [`RunHistoryEntry`] once terminal.

use serde::{Deserialize, Serialize};

use crate::types::{RunId, Timestamp};

/// Maximum stdout or stderr text accumulated per run (1 MiB per stream).
///
/// Output past this limit still streams to subscribers as events but is
/// no longer captured into the run record.
pub const MAX_CAPTURED_BYTES: usize = 1024 * 1024;

/// Lifecycle state of a run.
///
/// Transitions are monotonic: `Pending -> Running -> {Succeeded | Failed}`.
/// A terminal status never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Created, process not yet spawned.
    Pending,
    /// Process spawned and streaming output.
    Running,
    /// Process exited with code zero.
    Succeeded,
    /// Process exited non-zero, or could not be spawned at all.
    Failed,
}

impl RunStatus {
    /// Whether no further transitions are valid from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether moving from `self` to `next` respects the monotonic
    /// lifecycle.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            // A spawn failure goes straight from Pending to Failed.
            (Self::Pending, Self::Failed) => true,
            (Self::Running, Self::Succeeded) => true,
            (Self::Running, Self::Failed) => true,
            _ => false,
        }
    }
}

/// One invocation of an external job.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: RunId,
    pub job_id: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    /// `None` until the process exits; stays `None` on spawn failure.
    pub exit_code: Option<i32>,
}

impl Run {
    /// Create a pending run.
    pub fn new(
        id: RunId,
        job_id: impl Into<String>,
        parameters: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id,
            job_id: job_id.into(),
            parameters,
            status: RunStatus::Pending,
            stdout: String::new(),
            stderr: String::new(),
            started_at: chrono::Utc::now(),
            finished_at: None,
            exit_code: None,
        }
    }

    /// Mark the process as spawned.
    pub fn mark_running(&mut self) {
        debug_assert!(self.status.can_transition_to(RunStatus::Running));
        self.status = RunStatus::Running;
    }

    /// Record process exit. Zero means success, anything else failure.
    pub fn finish(&mut self, exit_code: i32) {
        let next = if exit_code == 0 {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        debug_assert!(self.status.can_transition_to(next));
        self.status = next;
        self.exit_code = Some(exit_code);
        self.finished_at = Some(chrono::Utc::now());
    }

    /// Record that the process could never be spawned. The exit code
    /// stays `None`.
    pub fn fail_to_spawn(&mut self, error: &str) {
        debug_assert!(self.status.can_transition_to(RunStatus::Failed));
        self.status = RunStatus::Failed;
        self.finished_at = Some(chrono::Utc::now());
        if self.stderr.is_empty() {
            self.stderr = error.to_string();
        }
    }

    /// Append a stdout line to the captured text, respecting
    /// [`MAX_CAPTURED_BYTES`]. Returns `false` once the cap is reached.
    pub fn push_stdout(&mut self, line: &str) -> bool {
        push_capped(&mut self.stdout, line)
    }

    /// Append a stderr line to the captured text, respecting
    /// [`MAX_CAPTURED_BYTES`]. Returns `false` once the cap is reached.
    pub fn push_stderr(&mut self, line: &str) -> bool {
        push_capped(&mut self.stderr, line)
    }

    /// Freeze a terminal run into its history snapshot.
    ///
    /// Callers must only invoke this once the run is terminal.
    pub fn into_history_entry(self) -> RunHistoryEntry {
        debug_assert!(self.status.is_terminal());
        RunHistoryEntry {
            run_id: self.id,
            job_id: self.job_id,
            parameters: self.parameters,
            success: self.status == RunStatus::Succeeded,
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code: self.exit_code,
            finished_at: self.finished_at.unwrap_or_else(chrono::Utc::now),
        }
    }
}

fn push_capped(buf: &mut String, line: &str) -> bool {
    if buf.len() >= MAX_CAPTURED_BYTES {
        return false;
    }
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
    true
}

/// Frozen snapshot of a terminal run, as listed by the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunHistoryEntry {
    pub run_id: RunId,
    pub job_id: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub finished_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
