//! Fold a progress-event stream into one coherent run view.
//!
//! The stream is causally ordered per run but may interleave stderr and
//! stdout arbitrarily, and a reused connection can still carry stragglers
//! from an abandoned run. [`RunView::apply`] absorbs all of that: it
//! binds the first operation id it sees, discards events correlated to
//! any other, keeps step counters monotone, and freezes the view at the
//! first terminal event.

use serde_json::Value;

use labstream_core::types::OperationId;
use labstream_events::{EventKind, ProgressEvent};

/// Derived client-side view of one run.
///
/// Pure state: no I/O, no subscriptions. [`RunSession`](crate::session::RunSession)
/// owns one of these and feeds it events.
#[derive(Debug, Clone, Default)]
pub struct RunView {
    /// A run has started and no terminal event has arrived yet.
    pub is_running: bool,
    /// The run ended successfully.
    pub is_complete: bool,
    /// The run failed (spawn failure or non-zero exit).
    pub has_error: bool,
    /// Every folded event, in arrival order.
    pub progress: Vec<ProgressEvent>,
    /// Latest step number reported by the job.
    pub current_step: Option<u64>,
    /// Declared or observed total step count. Never decreases.
    pub total_steps: u64,
    /// Highest step reported so far. Never decreases.
    pub completed_steps: u64,
    /// Most recent structured record emitted by the job; the job's
    /// final record is its result.
    pub result: Option<Value>,
    /// Human-readable failure description once `has_error` is set.
    pub error: Option<String>,
    /// Correlation id bound by the first event carrying one.
    operation_id: Option<OperationId>,
}

impl RunView {
    /// Fresh view with everything zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// The operation id this view is bound to, if any.
    pub fn operation_id(&self) -> Option<OperationId> {
        self.operation_id
    }

    /// Whether a terminal event has been folded.
    pub fn is_terminal(&self) -> bool {
        self.is_complete || self.has_error
    }

    /// Fold one event into the view.
    ///
    /// Returns `true` if the event was applied. Events are discarded
    /// without any state mutation when they carry an operation id other
    /// than the bound one (cross-talk from a stale run on a reused
    /// connection), or when the view is already terminal.
    pub fn apply(&mut self, event: &ProgressEvent) -> bool {
        if self.is_terminal() {
            return false;
        }

        match (self.operation_id, event.operation_id) {
            (Some(bound), Some(incoming)) if bound != incoming => {
                tracing::debug!(
                    run_id = %event.run_id,
                    bound = %bound,
                    incoming = %incoming,
                    "Discarding event from a different operation",
                );
                return false;
            }
            (None, Some(incoming)) => self.operation_id = Some(incoming),
            _ => {}
        }

        self.progress.push(event.clone());

        if let Some(total) = event.total_steps() {
            self.total_steps = self.total_steps.max(total);
        }
        if let Some(step) = event.step() {
            self.current_step = Some(self.current_step.map_or(step, |cur| cur.max(step)));
            self.completed_steps = self.completed_steps.max(step);
        }

        match event.event_type {
            EventKind::RunStarted => {
                self.is_running = true;
            }
            EventKind::StructuredOutput => {
                if let Some(record) = &event.data {
                    self.result = Some(record.clone());
                }
            }
            EventKind::LogLine => {}
            EventKind::RunEnded => {
                self.is_running = false;
                match event.exit_code() {
                    Some(0) => self.is_complete = true,
                    code => {
                        self.has_error = true;
                        self.error = Some(match code {
                            Some(code) => format!("Job exited with code {code}"),
                            None => "Job exited with unknown status".to_string(),
                        });
                    }
                }
            }
            EventKind::RunFailed => {
                self.is_running = false;
                self.has_error = true;
                self.error = Some(
                    event
                        .message
                        .clone()
                        .unwrap_or_else(|| "Run failed before the job started".to_string()),
                );
            }
        }

        true
    }

    /// Completion percentage, derived and clamped to `[0, 100]`.
    /// Zero whenever no total step count is known.
    pub fn progress_percentage(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        ((self.completed_steps as f64 / self.total_steps as f64) * 100.0).min(100.0)
    }

    /// Reset to the initial state, unbinding the operation id.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
