//! Process-wide mutable configuration for the guard stack: run mode,
//! thinking, approval mode, and spend-guard knobs.
//!
//! Modeled as a single value guarded by a lock: every read takes an
//! immutable snapshot via `.clone()` so an in-flight run sees a
//! consistent configuration even if `chat/run-config` mutates it mid-run.

use serde::{Deserialize, Serialize};

use sa_domain::config::{ApprovalMode, Config};

/// `{ mode: interactive|supervised|autonomous, maxIterations, bypassAllPermissions }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Interactive,
    Supervised,
    Autonomous,
}

/// `{ level: off|low|medium|high, visibility: off|on|stream }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingLevel {
    Off,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingVisibility {
    Off,
    On,
    Stream,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThinkingConfig {
    pub level: ThinkingLevel,
    pub visibility: ThinkingVisibility,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            level: ThinkingLevel::Off,
            visibility: ThinkingVisibility::Off,
        }
    }
}

/// The single process-wide mutable value the guard stack and chat loop read
/// a snapshot of on every run. Seeded at boot from `Config` + environment
/// variables (`DAILY_BUDGET_USD`, `ALLOW_IRREVERSIBLE_ACTIONS`,
/// `DAILY_BUDGET_AUTO_PAUSE`), then mutated only via `chat/run-config`,
/// `chat/approval-mode`, and `chat/thinking`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub mode: RunMode,
    pub max_iterations: u32,
    pub economy_mode: bool,
    pub daily_budget_usd: Option<f64>,
    pub spend_paused: bool,
    pub auto_pause_on_limit: bool,
    pub allow_irreversible_actions: bool,
    pub approval_mode: ApprovalMode,
    pub bypass_all_permissions: bool,
    pub thinking: ThinkingConfig,
}

impl RuntimeConfig {
    /// Seed the runtime snapshot from boot-time `Config` plus env overrides.
    /// Env vars win over the TOML config, matching the corpus's "operators
    /// can flip the budget without editing config" convention.
    pub fn from_boot_config(config: &Config) -> Self {
        let daily_budget_usd = std::env::var("DAILY_BUDGET_USD")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .or(config.economy.daily_budget_usd);

        let allow_irreversible_actions = std::env::var("ALLOW_IRREVERSIBLE_ACTIONS")
            .ok()
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(config.guard.allow_irreversible_actions);

        let auto_pause_on_limit = std::env::var("DAILY_BUDGET_AUTO_PAUSE")
            .ok()
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(config.economy.auto_pause_on_limit);

        Self {
            mode: RunMode::Interactive,
            max_iterations: config.guard.max_iterations,
            economy_mode: config.economy.enabled,
            daily_budget_usd,
            spend_paused: false,
            auto_pause_on_limit,
            allow_irreversible_actions,
            approval_mode: config.guard.default_approval_mode,
            bypass_all_permissions: false,
            thinking: ThinkingConfig::default(),
        }
    }

    /// The approval gate is forced to `off` and locked when the run mode
    /// has `bypassAllPermissions` set.
    pub fn effective_approval_mode(&self) -> ApprovalMode {
        if self.bypass_all_permissions {
            ApprovalMode::Off
        } else {
            self.approval_mode
        }
    }

    /// `effectiveMaxIterations = min(configured, economyCap if economy enabled)`.
    pub fn effective_max_iterations(&self, economy_cap: Option<u32>) -> u32 {
        match (self.economy_mode, economy_cap) {
            (true, Some(cap)) => self.max_iterations.min(cap),
            _ => self.max_iterations,
        }
    }

    /// `min(baseline, economyCap if economy enabled)` for tool-result
    /// truncation, mirroring [`Self::effective_max_iterations`].
    pub fn effective_tool_result_max_chars(&self, baseline: usize, economy_cap: Option<usize>) -> usize {
        match (self.economy_mode, economy_cap) {
            (true, Some(cap)) => baseline.min(cap),
            _ => baseline,
        }
    }

    /// Thinking is forced fully off while economy mode is active, regardless
    /// of the configured level/visibility — mirrors how
    /// [`Self::effective_approval_mode`] forces the approval gate off under
    /// `bypassAllPermissions`.
    pub fn effective_thinking(&self) -> ThinkingConfig {
        if self.economy_mode {
            ThinkingConfig::default()
        } else {
            self.thinking
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypass_forces_approval_off() {
        let mut rc = RuntimeConfig::from_boot_config(&Config::default());
        rc.approval_mode = ApprovalMode::Always;
        rc.bypass_all_permissions = true;
        assert_eq!(rc.effective_approval_mode(), ApprovalMode::Off);
    }

    #[test]
    fn economy_cap_clamps_max_iterations() {
        let mut rc = RuntimeConfig::from_boot_config(&Config::default());
        rc.max_iterations = 25;
        rc.economy_mode = true;
        assert_eq!(rc.effective_max_iterations(Some(5)), 5);
        assert_eq!(rc.effective_max_iterations(None), 25);
    }

    #[test]
    fn economy_disabled_ignores_cap() {
        let mut rc = RuntimeConfig::from_boot_config(&Config::default());
        rc.max_iterations = 25;
        rc.economy_mode = false;
        assert_eq!(rc.effective_max_iterations(Some(5)), 25);
    }

    #[test]
    fn economy_cap_clamps_tool_result_max_chars() {
        let mut rc = RuntimeConfig::from_boot_config(&Config::default());
        rc.economy_mode = true;
        assert_eq!(rc.effective_tool_result_max_chars(4000, Some(500)), 500);
        assert_eq!(rc.effective_tool_result_max_chars(4000, None), 4000);
    }

    #[test]
    fn economy_disabled_ignores_tool_result_cap() {
        let mut rc = RuntimeConfig::from_boot_config(&Config::default());
        rc.economy_mode = false;
        assert_eq!(rc.effective_tool_result_max_chars(4000, Some(500)), 4000);
    }

    #[test]
    fn economy_mode_forces_thinking_off() {
        let mut rc = RuntimeConfig::from_boot_config(&Config::default());
        rc.thinking = ThinkingConfig { level: ThinkingLevel::High, visibility: ThinkingVisibility::Stream };
        rc.economy_mode = true;
        let effective = rc.effective_thinking();
        assert_eq!(effective.level, ThinkingLevel::Off);
        assert_eq!(effective.visibility, ThinkingVisibility::Off);
    }

    #[test]
    fn economy_disabled_leaves_thinking_untouched() {
        let mut rc = RuntimeConfig::from_boot_config(&Config::default());
        rc.thinking = ThinkingConfig { level: ThinkingLevel::High, visibility: ThinkingVisibility::Stream };
        rc.economy_mode = false;
        let effective = rc.effective_thinking();
        assert_eq!(effective.level, ThinkingLevel::High);
        assert_eq!(effective.visibility, ThinkingVisibility::Stream);
    }

    #[test]
    fn from_boot_config_seeds_economy_mode_from_config() {
        let mut config = Config::default();
        config.economy.enabled = true;
        let rc = RuntimeConfig::from_boot_config(&config);
        assert!(rc.economy_mode);
    }
}
