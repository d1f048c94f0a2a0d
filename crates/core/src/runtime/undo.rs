//! Undo Service: replays reversals recorded against the Action
//! Journal.
//!
//! A tool's reverse-handler is looked up by name via the [`ReverseHandler`]
//! registry the Tool Registry builds at startup from each
//! `ToolDefinition.reverseHint`; this module only owns the ordering/LIFO
//! bookkeeping and
//! the journal-write side of undo/redo, not tool execution itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::runtime::journal::{ActionId, ActionJournal, ActionOutcome, Reversal};

/// Replays (or re-applies) one action given its original arguments. Tools
/// that are undoable register one of these; tools without one are simply
/// absent from the undo cursor.
#[async_trait]
pub trait ReverseHandler: Send + Sync {
    /// Undo: invoked with the original action's `args`. Returns the
    /// reversal's result value on success.
    async fn undo(&self, args: &Value) -> Result<Value, String>;

    /// Redo: re-apply the original action. Default implementation just
    /// calls `undo` again is wrong for most tools, so this has no default —
    /// every registered handler must supply both directions.
    async fn redo(&self, args: &Value) -> Result<Value, String>;
}

/// Per-tool reverse-handlers, keyed by tool name.
#[derive(Default)]
pub struct ReverseHandlerRegistry {
    handlers: HashMap<String, Arc<dyn ReverseHandler>>,
}

impl ReverseHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Into<String>, handler: Arc<dyn ReverseHandler>) {
        self.handlers.insert(tool.into(), handler);
    }

    pub fn get(&self, tool: &str) -> Option<Arc<dyn ReverseHandler>> {
        self.handlers.get(tool).cloned()
    }
}

/// One entry of an undo/redo batch result.
#[derive(Debug, Clone, Serialize)]
pub struct UndoOutcome {
    pub action_id: ActionId,
    pub tool: String,
    pub success: bool,
    pub error: Option<String>,
}

pub struct UndoService {
    journal: Arc<ActionJournal>,
    handlers: ReverseHandlerRegistry,
}

impl UndoService {
    pub fn new(journal: Arc<ActionJournal>, handlers: ReverseHandlerRegistry) -> Self {
        Self { journal, handlers }
    }

    async fn apply_one(&self, target_id: ActionId, direction: Direction) -> UndoOutcome {
        let Some(record) = self.journal.get(target_id) else {
            return UndoOutcome {
                action_id: target_id,
                tool: String::new(),
                success: false,
                error: Some("unknown action id".into()),
            };
        };

        let Some(handler) = self.handlers.get(&record.tool) else {
            return UndoOutcome {
                action_id: target_id,
                tool: record.tool,
                success: false,
                error: Some("tool has no reverse-handler".into()),
            };
        };

        let reversal_id = self.journal.record(crate::runtime::journal::ActionDraft {
            run_id: record.run_id.clone(),
            tool: record.tool.clone(),
            category: crate::runtime::journal::ToolCategory::Meta,
            args: record.args.clone(),
            approval: crate::runtime::journal::ActionApproval::Auto,
            undoable: false,
        });

        let result = match direction {
            Direction::Undo => handler.undo(&record.args).await,
            Direction::Redo => handler.redo(&record.args).await,
        };

        let (outcome, success, error) = match result {
            Ok(value) => (ActionOutcome::Success(value), true, None),
            Err(message) => (ActionOutcome::Failure(message.clone()), false, Some(message)),
        };

        self.journal.complete(
            reversal_id,
            outcome,
            Some(Reversal {
                pairs_with: target_id,
            }),
        );

        UndoOutcome {
            action_id: target_id,
            tool: record.tool,
            success,
            error,
        }
    }

    pub async fn undo_one(&self, id: ActionId) -> UndoOutcome {
        self.apply_one(id, Direction::Undo).await
    }

    pub async fn redo_one(&self, id: ActionId) -> UndoOutcome {
        self.apply_one(id, Direction::Redo).await
    }

    /// Most recent N undoable records, LIFO. Partial failure is allowed:
    /// a failing reversal is sealed with `error` and the cursor does not
    /// advance past it, but the batch continues to the next target.
    pub async fn undo_last_n(&self, n: usize) -> Vec<UndoOutcome> {
        let mut targets = self.journal.list_undoable();
        targets.sort_by_key(|r| r.started_at);
        targets.reverse();
        targets.truncate(n);

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            outcomes.push(self.apply_one(target.id, Direction::Undo).await);
        }
        outcomes
    }

    pub async fn undo_all(&self) -> Vec<UndoOutcome> {
        self.undo_last_n(usize::MAX).await
    }

    pub async fn redo_last_n(&self, n: usize) -> Vec<UndoOutcome> {
        let mut targets = self.journal.list_redoable();
        targets.sort_by_key(|r| r.started_at);
        targets.reverse();
        targets.truncate(n);

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            outcomes.push(self.apply_one(target.id, Direction::Redo).await);
        }
        outcomes
    }

    pub async fn redo_all(&self) -> Vec<UndoOutcome> {
        self.redo_last_n(usize::MAX).await
    }
}

enum Direction {
    Undo,
    Redo,
}
