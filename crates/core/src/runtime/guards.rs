//! Guard Stack: four ordered checks applied before every tool execution.
//! Any guard that denies short-circuits with a synthetic `tool_result`
//! error; the caller (the Chat Loop) seals an `ActionRecord` with
//! `approval=bypassed|denied` and continues to the next tool call.
//!
//! Guards 3 (iteration cap) and 4 (spend) gate the loop itself rather than
//! an individual call, but are exposed here too so the whole stack lives
//! in one place alongside the other cross-cutting checks under `runtime/`.

use crate::runtime::journal::ToolCategory;
use crate::runtime::runtime_config::RuntimeConfig;
use crate::runtime::tools::ToolSpec;

/// Verbs that make an uncategorized tool "look mutating" for the purposes
/// of the undo-guarantee gate and the approval gate's `mutate` mode.
/// This is a heuristic, not a load-bearing security boundary — tool
/// authors should prefer an explicit `category` over relying on naming.
const MUTATING_VERBS: &[&str] = &[
    "write", "delete", "remove", "create", "update", "set", "install",
    "kill", "rm", "mv", "move", "patch", "modify", "drop", "truncate",
    "push", "publish", "deploy",
];

pub fn looks_mutating(tool_name: &str) -> bool {
    let lower = tool_name.to_ascii_lowercase();
    MUTATING_VERBS.iter().any(|verb| lower.contains(verb))
}

/// Result of the undo-guarantee + approval checks for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    /// Proceed straight to execution.
    Allow,
    /// Proceed, but only after a human resolves a pending approval.
    RequireApproval,
    /// Short-circuit: synthesize a `tool_result` error and seal the record
    /// as denied.
    Deny(String),
}

/// Guard 1: undo guarantee. `undoable` reflects the registry's static `isUndoable`
/// flag; `has_reversal` is `true` when a reverse-hint or registered
/// reverse-handler exists for *this specific call* (e.g. the exec static
/// lookup matched the given command).
pub fn check_undo_guarantee(
    runtime: &RuntimeConfig,
    tool_name: &str,
    spec: &ToolSpec,
    has_reversal: bool,
) -> Option<String> {
    if runtime.allow_irreversible_actions {
        return None;
    }

    // Introspection tools always pass.
    if tool_name == "undo" || tool_name == "actions" {
        return None;
    }

    // `process` tool (and its `.poll` / `.list` / `.log` forms) is read-only
    // by construction; only a bare mutating verb inside the name denies.
    if tool_name.starts_with("process.") {
        let safe_suffix = tool_name
            .strip_prefix("process.")
            .map(|s| matches!(s, "list" | "poll" | "log"))
            .unwrap_or(false);
        if safe_suffix {
            return None;
        }
    }

    match spec.category {
        ToolCategory::Read | ToolCategory::Meta => None,
        ToolCategory::Mutate | ToolCategory::Exec => {
            if spec.undoable || has_reversal {
                None
            } else {
                Some(format!(
                    "'{tool_name}' is {category:?} with no reversal plan and allowIrreversibleActions is false",
                    category = spec.category
                ))
            }
        }
    }
}

/// Guard 1 variant for tools the registry has no spec for at all (denied by
/// the "looks-mutating" name heuristic rather than a declared category).
pub fn check_undo_guarantee_unregistered(runtime: &RuntimeConfig, tool_name: &str) -> Option<String> {
    if runtime.allow_irreversible_actions {
        return None;
    }
    if looks_mutating(tool_name) {
        Some(format!(
            "'{tool_name}' is not registered and its name looks mutating; denied by the undo-guarantee gate"
        ))
    } else {
        None
    }
}

/// Guard 2: approval gate. Returns the verdict given the live approval mode,
/// whether `bypassAllPermissions` is locked, and whether this tool was
/// already granted `allowAlways` earlier in the run.
pub fn check_approval(runtime: &RuntimeConfig, category: ToolCategory, already_auto_approved: bool) -> GuardVerdict {
    if already_auto_approved {
        return GuardVerdict::Allow;
    }

    use sa_domain::config::ApprovalMode;
    match runtime.effective_approval_mode() {
        ApprovalMode::Off => GuardVerdict::Allow,
        ApprovalMode::Always => GuardVerdict::RequireApproval,
        ApprovalMode::Mutate => match category {
            ToolCategory::Mutate | ToolCategory::Exec => GuardVerdict::RequireApproval,
            ToolCategory::Read | ToolCategory::Meta => GuardVerdict::Allow,
        },
    }
}

/// Guard 3: iteration cap. `effectiveMaxIterations = min(configured, economyCap)`.
pub fn within_iteration_cap(runtime: &RuntimeConfig, iteration: u32, economy_cap: Option<u32>) -> bool {
    iteration < runtime.effective_max_iterations(economy_cap)
}

/// Guard 4: spend pre-run check. `Err` carries `(spent, budget)` for the
/// "spend limit reached" error. `spend_paused` is the operator override set
/// via `chat/run-config`'s `spendPaused` field — independent of whether the
/// rolling budget is actually exceeded, it blocks every run until cleared.
pub fn precheck_spend(status: &crate::runtime::spend::SpendStatus, spend_paused: bool) -> Result<(), (f64, f64)> {
    if spend_paused || (status.exceeded && status.auto_pause_on_limit) {
        Err((status.spent_24h, status.daily_budget_usd.unwrap_or(0.0)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::Config;
    use sa_domain::tool::ToolDefinition;

    fn spec(category: ToolCategory, undoable: bool) -> ToolSpec {
        ToolSpec {
            definition: ToolDefinition {
                name: "t".into(),
                description: "".into(),
                parameters: serde_json::json!({}),
            },
            category,
            undoable,
            reverse_hint: None,
        }
    }

    #[test]
    fn looks_mutating_matches_known_verbs() {
        assert!(looks_mutating("delete_record"));
        assert!(looks_mutating("FORCE_PUSH"));
        assert!(!looks_mutating("list_records"));
    }

    #[test]
    fn undo_guarantee_allows_read_and_meta() {
        let runtime = RuntimeConfig::from_boot_config(&Config::default());
        assert!(check_undo_guarantee(&runtime, "read_file", &spec(ToolCategory::Read, false), false).is_none());
        assert!(check_undo_guarantee(&runtime, "actions", &spec(ToolCategory::Meta, false), false).is_none());
    }

    #[test]
    fn undo_guarantee_denies_mutate_without_reversal() {
        let runtime = RuntimeConfig::from_boot_config(&Config::default());
        assert!(check_undo_guarantee(&runtime, "write_file", &spec(ToolCategory::Mutate, false), false).is_some());
    }

    #[test]
    fn undo_guarantee_allows_mutate_when_undoable() {
        let runtime = RuntimeConfig::from_boot_config(&Config::default());
        assert!(check_undo_guarantee(&runtime, "write_file", &spec(ToolCategory::Mutate, true), false).is_none());
    }

    #[test]
    fn undo_guarantee_allows_exec_with_static_reversal() {
        let runtime = RuntimeConfig::from_boot_config(&Config::default());
        assert!(check_undo_guarantee(&runtime, "exec", &spec(ToolCategory::Exec, false), true).is_none());
    }

    #[test]
    fn undo_guarantee_bypassed_when_irreversible_allowed() {
        let mut runtime = RuntimeConfig::from_boot_config(&Config::default());
        runtime.allow_irreversible_actions = true;
        assert!(check_undo_guarantee(&runtime, "write_file", &spec(ToolCategory::Mutate, false), false).is_none());
    }

    #[test]
    fn process_poll_always_passes_undo_guarantee() {
        let runtime = RuntimeConfig::from_boot_config(&Config::default());
        assert!(check_undo_guarantee(&runtime, "process.poll", &spec(ToolCategory::Read, false), false).is_none());
    }

    #[test]
    fn approval_off_allows_everything() {
        let mut runtime = RuntimeConfig::from_boot_config(&Config::default());
        runtime.approval_mode = sa_domain::config::ApprovalMode::Off;
        assert_eq!(check_approval(&runtime, ToolCategory::Mutate, false), GuardVerdict::Allow);
    }

    #[test]
    fn approval_always_requires_approval_even_for_read() {
        let mut runtime = RuntimeConfig::from_boot_config(&Config::default());
        runtime.approval_mode = sa_domain::config::ApprovalMode::Always;
        assert_eq!(check_approval(&runtime, ToolCategory::Read, false), GuardVerdict::RequireApproval);
    }

    #[test]
    fn approval_mutate_only_requires_for_mutate_and_exec() {
        let mut runtime = RuntimeConfig::from_boot_config(&Config::default());
        runtime.approval_mode = sa_domain::config::ApprovalMode::Mutate;
        assert_eq!(check_approval(&runtime, ToolCategory::Read, false), GuardVerdict::Allow);
        assert_eq!(check_approval(&runtime, ToolCategory::Mutate, false), GuardVerdict::RequireApproval);
        assert_eq!(check_approval(&runtime, ToolCategory::Exec, false), GuardVerdict::RequireApproval);
    }

    #[test]
    fn bypass_all_permissions_forces_approval_off() {
        let mut runtime = RuntimeConfig::from_boot_config(&Config::default());
        runtime.approval_mode = sa_domain::config::ApprovalMode::Always;
        runtime.bypass_all_permissions = true;
        assert_eq!(check_approval(&runtime, ToolCategory::Mutate, false), GuardVerdict::Allow);
    }

    #[test]
    fn allow_always_short_circuits_to_allow() {
        let mut runtime = RuntimeConfig::from_boot_config(&Config::default());
        runtime.approval_mode = sa_domain::config::ApprovalMode::Always;
        assert_eq!(check_approval(&runtime, ToolCategory::Mutate, true), GuardVerdict::Allow);
    }

    #[test]
    fn iteration_cap_respects_economy_clamp() {
        let mut runtime = RuntimeConfig::from_boot_config(&Config::default());
        runtime.max_iterations = 10;
        runtime.economy_mode = true;
        assert!(within_iteration_cap(&runtime, 2, Some(3)));
        assert!(!within_iteration_cap(&runtime, 3, Some(3)));
    }
}
