//! Bounded, newest-first cache of terminal runs.
//!
//! Entirely in-memory; the history is lost on restart by design. Strict
//! FIFO-by-insertion eviction, no access-based reordering.

use std::collections::VecDeque;

use tokio::sync::RwLock;

use crate::run::RunHistoryEntry;

/// Reference capacity used when none is configured.
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Fixed-capacity, eviction-ordered store of completed runs.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// injected into the orchestrator and the history route.
pub struct RunHistory {
    entries: RwLock<VecDeque<RunHistoryEntry>>,
    capacity: usize,
}

impl RunHistory {
    /// Create a history with the given capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Insert a terminal run at the front, evicting the oldest entry if
    /// the capacity is exceeded. O(1) amortized.
    pub async fn record(&self, entry: RunHistoryEntry) {
        let mut entries = self.entries.write().await;
        entries.push_front(entry);
        while entries.len() > self.capacity {
            entries.pop_back();
        }
    }

    /// Snapshot of all entries, newest first. A copy, not a live view.
    pub async fn list(&self) -> Vec<RunHistoryEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Current number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the history holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u32) -> RunHistoryEntry {
        RunHistoryEntry {
            run_id: uuid::Uuid::new_v4(),
            job_id: format!("job-{n}"),
            parameters: serde_json::Map::new(),
            success: true,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            finished_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_newest_first() {
        let history = RunHistory::new(10);
        history.record(entry(1)).await;
        history.record(entry(2)).await;
        history.record(entry(3)).await;

        let listed = history.list().await;
        let job_ids: Vec<&str> = listed.iter().map(|e| e.job_id.as_str()).collect();
        assert_eq!(job_ids, vec!["job-3", "job-2", "job-1"]);
    }

    #[tokio::test]
    async fn never_exceeds_capacity() {
        let history = RunHistory::new(3);
        for n in 0..10 {
            history.record(entry(n)).await;
            assert!(history.len().await <= 3);
        }
    }

    #[tokio::test]
    async fn evicts_oldest_at_capacity_plus_one() {
        let history = RunHistory::new(50);
        for n in 0..51 {
            history.record(entry(n)).await;
        }

        let listed = history.list().await;
        assert_eq!(listed.len(), 50);
        // The first-inserted entry is gone; the newest leads the list.
        assert!(listed.iter().all(|e| e.job_id != "job-0"));
        assert_eq!(listed[0].job_id, "job-50");
        assert_eq!(listed[49].job_id, "job-1");
    }

    #[tokio::test]
    async fn list_returns_a_copy() {
        let history = RunHistory::new(10);
        history.record(entry(1)).await;

        let snapshot = history.list().await;
        history.record(entry(2)).await;

        // The earlier snapshot is unaffected by later inserts.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(history.len().await, 2);
    }

    #[tokio::test]
    async fn zero_capacity_is_clamped_to_one() {
        let history = RunHistory::new(0);
        assert_eq!(history.capacity(), 1);
        history.record(entry(1)).await;
        history.record(entry(2)).await;
        assert_eq!(history.len().await, 1);
    }
}
