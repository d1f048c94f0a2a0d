//! Run Supervisor: a process-wide map `runId -> RunState`.
//!
//! A run exists only while it is live — registration adds it, terminal
//! emission or cancellation removes it. Run history is not tracked here;
//! it lives in the Action Journal instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::runtime::cancel::CancelToken;

/// Snapshot of one live run.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub iteration: u32,
    pub max_iterations: u32,
}

struct RunEntry {
    state: RunState,
    cancel: CancelToken,
}

/// Process-wide live-run registry. Ids are `"run-<wallclock>-<counter>"` —
/// monotonic within the process, unique across it.
pub struct RunSupervisor {
    runs: RwLock<HashMap<String, RunEntry>>,
    counter: AtomicU64,
}

impl Default for RunSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSupervisor {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    fn next_run_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("run-{}-{n}", Utc::now().timestamp_millis())
    }

    /// Allocate and register a new run, returning its id and cancel token.
    pub fn register(&self, session_id: &str, max_iterations: u32) -> (String, CancelToken) {
        let run_id = self.next_run_id();
        let cancel = CancelToken::new();
        let state = RunState {
            run_id: run_id.clone(),
            session_id: session_id.to_string(),
            started_at: Utc::now(),
            iteration: 0,
            max_iterations,
        };
        self.runs.write().insert(
            run_id.clone(),
            RunEntry {
                state,
                cancel: cancel.clone(),
            },
        );
        (run_id, cancel)
    }

    /// Update the live iteration count for a run (called once per loop turn).
    pub fn set_iteration(&self, run_id: &str, iteration: u32) {
        if let Some(entry) = self.runs.write().get_mut(run_id) {
            entry.state.iteration = iteration;
        }
    }

    /// Remove a run from the registry — called on terminal event or
    /// cancellation.
    pub fn finish(&self, run_id: &str) {
        self.runs.write().remove(run_id);
    }

    pub fn get(&self, run_id: &str) -> Option<RunState> {
        self.runs.read().get(run_id).map(|e| e.state.clone())
    }

    pub fn is_live(&self, run_id: &str) -> bool {
        self.runs.read().contains_key(run_id)
    }

    /// Cancel exactly one run. Returns `true` if it was found.
    pub fn abort_run(&self, run_id: &str) -> bool {
        if let Some(entry) = self.runs.read().get(run_id) {
            entry.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Cancel every live run belonging to `session_id`. Returns the count
    /// cancelled.
    pub fn abort_session(&self, session_id: &str) -> usize {
        let runs = self.runs.read();
        let mut count = 0;
        for entry in runs.values() {
            if entry.state.session_id == session_id {
                entry.cancel.cancel();
                count += 1;
            }
        }
        count
    }

    /// Cancel every live run in the process. Returns the count cancelled.
    pub fn abort_all(&self) -> usize {
        let runs = self.runs.read();
        for entry in runs.values() {
            entry.cancel.cancel();
        }
        runs.len()
    }

    /// Number of runs currently live (for `GET chat/run-config` / status
    /// introspection).
    pub fn live_count(&self) -> usize {
        self.runs.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_allocates_unique_ids() {
        let sup = RunSupervisor::new();
        let (id1, _) = sup.register("s1", 10);
        let (id2, _) = sup.register("s1", 10);
        assert_ne!(id1, id2);
        assert!(id1.starts_with("run-"));
    }

    #[test]
    fn register_then_finish_removes_entry() {
        let sup = RunSupervisor::new();
        let (run_id, _) = sup.register("s1", 10);
        assert!(sup.is_live(&run_id));
        sup.finish(&run_id);
        assert!(!sup.is_live(&run_id));
    }

    #[test]
    fn abort_run_cancels_its_token() {
        let sup = RunSupervisor::new();
        let (run_id, cancel) = sup.register("s1", 10);
        assert!(sup.abort_run(&run_id));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn abort_run_unknown_returns_false() {
        let sup = RunSupervisor::new();
        assert!(!sup.abort_run("run-does-not-exist"));
    }

    #[test]
    fn abort_session_cancels_all_its_runs_only() {
        let sup = RunSupervisor::new();
        let (_, cancel_a1) = sup.register("session-a", 10);
        let (_, cancel_a2) = sup.register("session-a", 10);
        let (_, cancel_b1) = sup.register("session-b", 10);

        let count = sup.abort_session("session-a");
        assert_eq!(count, 2);
        assert!(cancel_a1.is_cancelled());
        assert!(cancel_a2.is_cancelled());
        assert!(!cancel_b1.is_cancelled());
    }

    #[test]
    fn abort_all_cancels_every_run() {
        let sup = RunSupervisor::new();
        let (_, cancel_a) = sup.register("session-a", 10);
        let (_, cancel_b) = sup.register("session-b", 10);

        let count = sup.abort_all();
        assert_eq!(count, 2);
        assert!(cancel_a.is_cancelled());
        assert!(cancel_b.is_cancelled());
    }

    #[test]
    fn set_iteration_updates_live_state() {
        let sup = RunSupervisor::new();
        let (run_id, _) = sup.register("s1", 10);
        sup.set_iteration(&run_id, 3);
        assert_eq!(sup.get(&run_id).unwrap().iteration, 3);
    }

    #[test]
    fn live_count_reflects_registrations_and_finishes() {
        let sup = RunSupervisor::new();
        assert_eq!(sup.live_count(), 0);
        let (run_id, _) = sup.register("s1", 10);
        assert_eq!(sup.live_count(), 1);
        sup.finish(&run_id);
        assert_eq!(sup.live_count(), 0);
    }
}
