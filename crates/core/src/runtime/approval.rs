//! Exec approval workflow — gates dangerous commands behind human approval.
//!
//! When a command matches one of the configured `approval_patterns`, execution
//! is paused until a human approves or denies the request via the REST API.
//! A timeout ensures the system never blocks indefinitely.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The decision made by a human reviewer.
#[derive(Debug)]
pub enum ApprovalDecision {
    Approved,
    Denied { reason: Option<String> },
}

/// A pending approval waiting for human review.
pub struct PendingApproval {
    pub id: Uuid,
    pub command: String,
    pub session_key: String,
    /// Run this approval belongs to — `allowAlways` installs the
    /// auto-approve pattern for the rest of *this* run only.
    pub run_id: String,
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub respond: oneshot::Sender<ApprovalDecision>,
}

/// Serializable snapshot of a pending approval (for API responses / SSE events).
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalInfo {
    pub id: Uuid,
    pub command: String,
    pub session_key: String,
    pub created_at: DateTime<Utc>,
}

impl From<&PendingApproval> for ApprovalInfo {
    fn from(p: &PendingApproval) -> Self {
        Self {
            id: p.id,
            command: p.command.clone(),
            session_key: p.session_key.clone(),
            created_at: p.created_at,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Thread-safe store for pending exec approvals.
///
/// Each approval is associated with a `oneshot::Sender` that unblocks the
/// waiting `dispatch_exec` call when resolved.
pub struct ApprovalStore {
    pending: RwLock<HashMap<Uuid, PendingApproval>>,
    /// `run_id -> tool names auto-approved for the rest of that run`
    /// (the `allowAlways` verdict).
    auto_approved: RwLock<HashMap<String, HashSet<String>>>,
    timeout: Duration,
}

impl ApprovalStore {
    /// Create a new store with the given approval timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            auto_approved: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Whether `tool` was previously granted `allowAlways` within `run_id`.
    pub fn is_auto_approved(&self, run_id: &str, tool: &str) -> bool {
        self.auto_approved
            .read()
            .get(run_id)
            .is_some_and(|tools| tools.contains(tool))
    }

    /// Drop a run's auto-approve set once the run ends.
    pub fn clear_run(&self, run_id: &str) {
        self.auto_approved.write().remove(run_id);
    }

    /// The configured approval timeout duration.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Insert a pending approval. Returns the serializable info snapshot.
    pub fn insert(&self, approval: PendingApproval) -> ApprovalInfo {
        let info = ApprovalInfo::from(&approval);
        self.pending.write().insert(approval.id, approval);
        info
    }

    /// Resolve a pending approval as approved. When `allow_always` is set,
    /// the tool is auto-approved for the rest of the owning run. Returns
    /// `true` if found.
    pub fn approve(&self, id: &Uuid, allow_always: bool) -> bool {
        if let Some(pending) = self.pending.write().remove(id) {
            if allow_always {
                self.auto_approved
                    .write()
                    .entry(pending.run_id.clone())
                    .or_default()
                    .insert(pending.tool.clone());
            }
            let _ = pending.respond.send(ApprovalDecision::Approved);
            return true;
        }
        false
    }

    /// Resolve a pending approval as denied. Returns `true` if found.
    pub fn deny(&self, id: &Uuid, reason: Option<String>) -> bool {
        if let Some(pending) = self.pending.write().remove(id) {
            let _ = pending.respond.send(ApprovalDecision::Denied { reason });
            return true;
        }
        false
    }

    /// Remove a timed-out approval (called when the receiver times out).
    pub fn remove_expired(&self, id: &Uuid) {
        self.pending.write().remove(id);
    }

    /// Scan all pending approvals and deny/remove the ones older than the
    /// configured timeout. Called periodically from a background task so a
    /// pending approval whose caller stopped polling doesn't linger forever.
    pub fn sweep_expired(&self) {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.timeout).unwrap_or_default();
        let expired_ids: Vec<Uuid> = self
            .pending
            .read()
            .values()
            .filter(|p| p.created_at < cutoff)
            .map(|p| p.id)
            .collect();

        for id in expired_ids {
            if let Some(pending) = self.pending.write().remove(&id) {
                let _ = pending.respond.send(ApprovalDecision::Denied {
                    reason: Some("approval request timed out".into()),
                });
            }
        }
    }

    /// List all currently pending approvals (for dashboard introspection).
    pub fn list_pending(&self) -> Vec<ApprovalInfo> {
        self.pending
            .read()
            .values()
            .map(ApprovalInfo::from)
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
