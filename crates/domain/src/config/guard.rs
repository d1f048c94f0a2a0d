use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guard stack defaults
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Boot-time defaults for the guard stack (undo-guarantee gate, approval
/// gate, run-mode cap). `POST chat/approval-mode` and `POST chat/run-config`
/// can change the live values for the life of the process; this is only
/// the seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Mirrors the `ALLOW_IRREVERSIBLE_ACTIONS` env var. When `false`, a
    /// tool call the undo-guarantee gate can't pair with a reversal is
    /// denied outright rather than requiring approval.
    #[serde(default)]
    pub allow_irreversible_actions: bool,
    /// Default approval mode applied to new sessions.
    #[serde(default)]
    pub default_approval_mode: ApprovalMode,
    /// Hard ceiling on loop iterations per run, independent of any
    /// per-request override.
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            allow_irreversible_actions: false,
            default_approval_mode: ApprovalMode::default(),
            max_iterations: d_max_iterations(),
        }
    }
}

/// Controls when the approval gate pauses a tool call for human sign-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// No tool call ever needs approval (undo-guarantee gate still applies).
    Off,
    /// Only tool calls that look mutating require approval.
    #[default]
    Mutate,
    /// Every tool call requires approval.
    Always,
}

fn d_max_iterations() -> u32 {
    25
}
