//! `AppState` construction and background-task spawning extracted from
//! `main.rs`, shared by the `serve` and `run` CLI commands so they boot the
//! same runtime with or without an HTTP listener in front of it.

use sa_domain::config::{Config, ConfigSeverity};

use crate::state::AppState;

/// Validate config and assemble a fully-wired [`AppState`]. Shared boot path
/// for `serve` and `run`.
pub fn build_app_state(config: Config) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let state = AppState::new(config).map_err(|e| anyhow::anyhow!("{e}"))?;

    if state.llm.is_empty() {
        tracing::warn!(
            "no LLM providers initialized — configure at least one under [llm.providers]"
        );
    } else {
        tracing::info!(providers = state.llm.len(), "LLM provider registry ready");
    }

    Ok(state)
}

/// Spawn the long-running background tokio tasks (session-lock pruning,
/// expired-approval sweeping). Call this **after** [`build_app_state`] when
/// running the HTTP server; the one-shot `run` command skips it.
pub fn spawn_background_tasks(state: &AppState) {
    {
        let session_locks = state.session_locks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                session_locks.prune_idle();
            }
        });
    }

    {
        let approvals = state.approvals.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
            loop {
                interval.tick().await;
                approvals.sweep_expired();
            }
        });
    }

    tracing::info!("background tasks spawned");
}
