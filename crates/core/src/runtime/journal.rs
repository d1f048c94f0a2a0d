//! Action Journal: append-only log of sealed `ActionRecord`s.
//!
//! An append-only log of every tool invocation, written before execution
//! and sealed after. Once sealed a record is never mutated again; reversal
//! pairing is recorded by appending a *new* record rather than editing the
//! original, so the journal itself is the audit trail the Undo Service and
//! the `GET chat/actions` RPC read from.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Monotonic, process-unique identifier. Not reused across restarts —
/// the journal itself is in-memory only (durability is delegated the
/// same way `ChatHistoryStore` delegates transcript persistence).
pub type ActionId = u64;

/// `ToolDefinition.category` governs the undo-guarantee and approval
/// gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Read,
    Mutate,
    Exec,
    Meta,
}

/// `ActionRecord.approval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionApproval {
    Auto,
    Granted,
    Denied,
    Bypassed,
}

/// Marks a record as the reversal of an earlier one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reversal {
    pub pairs_with: ActionId,
}

/// What the caller wants journaled before a tool runs.
pub struct ActionDraft {
    pub run_id: String,
    pub tool: String,
    pub category: ToolCategory,
    pub args: Value,
    pub approval: ActionApproval,
    pub undoable: bool,
}

/// How a tool call ended, passed to [`ActionJournal::complete`].
pub enum ActionOutcome {
    Success(Value),
    Failure(String),
}

/// One entry in the journal. Append-only; fields after `started_at` are
/// `None` until [`ActionJournal::complete`] seals the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: ActionId,
    pub run_id: String,
    pub tool: String,
    pub category: ToolCategory,
    pub args: Value,
    pub approval: ActionApproval,
    pub undoable: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub reversal: Option<Reversal>,
}

/// Optional filter for [`ActionJournal::list`].
#[derive(Debug, Clone, Default)]
pub struct ActionFilter {
    pub run_id: Option<String>,
    pub category: Option<ToolCategory>,
    pub undoable: Option<bool>,
}

/// Append-only, lock-protected journal of tool invocations for the whole
/// process (actions outlive the run that created them).
pub struct ActionJournal {
    records: RwLock<Vec<ActionRecord>>,
    next_id: AtomicU64,
}

impl ActionJournal {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an id, stamp `started_at`, write an open record. Must be
    /// called before the tool executes.
    pub fn record(&self, draft: ActionDraft) -> ActionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = ActionRecord {
            id,
            run_id: draft.run_id,
            tool: draft.tool,
            category: draft.category,
            args: draft.args,
            approval: draft.approval,
            undoable: draft.undoable,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            result: None,
            error: None,
            reversal: None,
        };
        self.records.write().push(record);
        id
    }

    /// Seal an open record with its outcome and, if this record *is* a
    /// reversal of an earlier one, the pairing.
    ///
    /// Returns `false` if `id` is unknown or already sealed — callers treat
    /// that as a journal write failure — write failures fail the outer
    /// tool call.
    pub fn complete(&self, id: ActionId, outcome: ActionOutcome, reversal: Option<Reversal>) -> bool {
        let mut records = self.records.write();
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        if record.ended_at.is_some() {
            return false;
        }

        let ended_at = Utc::now();
        record.duration_ms = Some((ended_at - record.started_at).num_milliseconds());
        record.ended_at = Some(ended_at);
        match outcome {
            ActionOutcome::Success(value) => record.result = Some(value),
            ActionOutcome::Failure(message) => record.error = Some(message),
        }
        record.reversal = reversal;
        true
    }

    /// Time-ordered, optionally filtered. Reads never fail.
    pub fn list(&self, filter: &ActionFilter) -> Vec<ActionRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| filter.run_id.as_deref().map_or(true, |id| r.run_id == id))
            .filter(|r| filter.category.map_or(true, |c| r.category == c))
            .filter(|r| filter.undoable.map_or(true, |u| r.undoable == u))
            .cloned()
            .collect()
    }

    /// Most recent reversal record (if any) whose `reversal.pairs_with`
    /// targets `target`.
    fn latest_reversal_for(records: &[ActionRecord], target: ActionId) -> Option<&ActionRecord> {
        records
            .iter()
            .rev()
            .find(|r| matches!(&r.reversal, Some(rv) if rv.pairs_with == target))
    }

    /// Sealed, undoable original actions with no *successful* reversal
    /// after them.
    pub fn list_undoable(&self) -> Vec<ActionRecord> {
        let records = self.records.read();
        records
            .iter()
            .filter(|r| r.undoable && r.reversal.is_none() && r.ended_at.is_some())
            .filter(|r| match Self::latest_reversal_for(&records, r.id) {
                Some(rev) => rev.error.is_some(),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Sealed, undoable original actions whose most recent reversal
    /// succeeded. Mutually exclusive with `list_undoable`.
    pub fn list_redoable(&self) -> Vec<ActionRecord> {
        let records = self.records.read();
        records
            .iter()
            .filter(|r| r.undoable && r.reversal.is_none() && r.ended_at.is_some())
            .filter(|r| matches!(Self::latest_reversal_for(&records, r.id), Some(rev) if rev.error.is_none()))
            .cloned()
            .collect()
    }

    /// Look up a single record by id (used by the Undo Service to fetch
    /// original args/reverse-hint before invoking a reverse-handler).
    pub fn get(&self, id: ActionId) -> Option<ActionRecord> {
        self.records.read().iter().find(|r| r.id == id).cloned()
    }
}

impl Default for ActionJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(tool: &str, undoable: bool) -> ActionDraft {
        ActionDraft {
            run_id: "run-1".into(),
            tool: tool.into(),
            category: ToolCategory::Mutate,
            args: serde_json::json!({}),
            approval: ActionApproval::Auto,
            undoable,
        }
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let journal = ActionJournal::new();
        let a = journal.record(draft("write_file", true));
        let b = journal.record(draft("write_file", true));
        assert!(b > a);
    }

    #[test]
    fn complete_seals_and_rejects_double_complete() {
        let journal = ActionJournal::new();
        let id = journal.record(draft("write_file", true));
        assert!(journal.complete(id, ActionOutcome::Success(serde_json::json!("ok")), None));
        assert!(!journal.complete(id, ActionOutcome::Success(serde_json::json!("ok")), None));
    }

    #[test]
    fn unsealed_record_is_neither_undoable_nor_redoable() {
        let journal = ActionJournal::new();
        journal.record(draft("write_file", true));
        assert!(journal.list_undoable().is_empty());
        assert!(journal.list_redoable().is_empty());
    }

    #[test]
    fn sealed_undoable_action_appears_in_undo_cursor() {
        let journal = ActionJournal::new();
        let id = journal.record(draft("write_file", true));
        journal.complete(id, ActionOutcome::Success(serde_json::json!("ok")), None);
        let undoable = journal.list_undoable();
        assert_eq!(undoable.len(), 1);
        assert_eq!(undoable[0].id, id);
        assert!(journal.list_redoable().is_empty());
    }

    #[test]
    fn successful_reversal_moves_action_to_redo_cursor() {
        let journal = ActionJournal::new();
        let id = journal.record(draft("write_file", true));
        journal.complete(id, ActionOutcome::Success(serde_json::json!("ok")), None);

        let reversal_id = journal.record(draft("write_file", false));
        journal.complete(
            reversal_id,
            ActionOutcome::Success(serde_json::json!("undone")),
            Some(Reversal { pairs_with: id }),
        );

        assert!(journal.list_undoable().is_empty());
        let redoable = journal.list_redoable();
        assert_eq!(redoable.len(), 1);
        assert_eq!(redoable[0].id, id);
    }

    #[test]
    fn failed_reversal_leaves_action_undoable() {
        let journal = ActionJournal::new();
        let id = journal.record(draft("write_file", true));
        journal.complete(id, ActionOutcome::Success(serde_json::json!("ok")), None);

        let reversal_id = journal.record(draft("write_file", false));
        journal.complete(
            reversal_id,
            ActionOutcome::Failure("reverse handler failed".into()),
            Some(Reversal { pairs_with: id }),
        );

        assert_eq!(journal.list_undoable().len(), 1);
        assert!(journal.list_redoable().is_empty());
    }

    #[test]
    fn non_undoable_action_never_appears_in_either_cursor() {
        let journal = ActionJournal::new();
        let id = journal.record(draft("read_file", false));
        journal.complete(id, ActionOutcome::Success(serde_json::json!("contents")), None);
        assert!(journal.list_undoable().is_empty());
        assert!(journal.list_redoable().is_empty());
    }

    #[test]
    fn list_filters_by_run_and_category() {
        let journal = ActionJournal::new();
        let mut d1 = draft("exec", true);
        d1.category = ToolCategory::Exec;
        d1.run_id = "run-a".into();
        let mut d2 = draft("read_file", false);
        d2.category = ToolCategory::Read;
        d2.run_id = "run-b".into();
        journal.record(d1);
        journal.record(d2);

        assert_eq!(
            journal
                .list(&ActionFilter {
                    run_id: Some("run-a".into()),
                    ..Default::default()
                })
                .len(),
            1
        );
        assert_eq!(
            journal
                .list(&ActionFilter {
                    category: Some(ToolCategory::Read),
                    ..Default::default()
                })
                .len(),
            1
        );
    }
}
