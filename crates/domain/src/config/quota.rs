use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Economy / spend guard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Boot-time defaults for the rolling 24-hour spend guard and the economy
/// mode caps. The budget fields here seed the initial runtime snapshot;
/// `POST chat/run-config` can override `daily_budget_usd` and `economy_mode`
/// for the life of the process, but these are what a freshly started
/// daemon starts with.
///
/// `daily_budget_usd` and `auto_pause_on_limit` mirror the `DAILY_BUDGET_USD`
/// and `DAILY_BUDGET_AUTO_PAUSE` environment variables — whichever is set
/// wins over this config, so operators can flip the budget without editing
/// the TOML file.
///
/// When `enabled`, economy mode clamps the loop's effective iteration cap
/// and tool-result size, lowers the context-window compaction threshold,
/// and forces `thinking` off for the run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EconomyConfig {
    /// Rolling 24h USD budget across all providers and models. `None` means
    /// uncapped.
    #[serde(default)]
    pub daily_budget_usd: Option<f64>,
    /// When the budget is exhausted, stop starting new runs entirely
    /// (`paused`) instead of merely rejecting provider calls mid-run.
    #[serde(default)]
    pub auto_pause_on_limit: bool,
    /// Boot-time default for economy mode. `POST chat/run-config` can flip
    /// this per-process via `economyMode`.
    #[serde(default)]
    pub enabled: bool,
    /// Clamp applied to `RuntimeConfig.max_iterations` when economy mode is
    /// active. `None` means economy mode doesn't touch the iteration cap.
    #[serde(default)]
    pub max_iterations_cap: Option<u32>,
    /// Clamp applied to tool-result truncation when economy mode is active.
    /// `None` falls back to the loop's baseline limit.
    #[serde(default)]
    pub tool_result_max_chars: Option<usize>,
    /// Approximate context-window budget, in tokens, used to trigger
    /// token-based compaction when economy mode is active.
    #[serde(default)]
    pub context_max_tokens: Option<usize>,
    /// Fraction of `context_max_tokens` (`0.0..=1.0`) at which compaction
    /// triggers, e.g. `0.8` compacts once the active history is estimated
    /// at 80% of the budget.
    #[serde(default)]
    pub context_compaction_threshold: Option<f64>,
}

/// Per-model pricing lives in `LlmConfig::pricing`; this module only carries
/// the budget knobs, since cost-per-token is a property of the model, not
/// of the guard.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_economy_config_is_unbounded() {
        let cfg = EconomyConfig::default();
        assert!(!cfg.enabled);
        assert!(cfg.max_iterations_cap.is_none());
        assert!(cfg.tool_result_max_chars.is_none());
        assert!(cfg.context_max_tokens.is_none());
        assert!(cfg.context_compaction_threshold.is_none());
    }

    #[test]
    fn deserialize_economy_caps() {
        let toml_str = r#"
            enabled = true
            max_iterations_cap = 5
            tool_result_max_chars = 1000
            context_max_tokens = 8000
            context_compaction_threshold = 0.75
        "#;
        let cfg: EconomyConfig = toml::from_str(toml_str).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.max_iterations_cap, Some(5));
        assert_eq!(cfg.tool_result_max_chars, Some(1000));
        assert_eq!(cfg.context_max_tokens, Some(8000));
        assert_eq!(cfg.context_compaction_threshold, Some(0.75));
    }
}
