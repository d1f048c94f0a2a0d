use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::RwLock;
use sa_domain::config::Config;
use sa_providers::registry::ProviderRegistry;

use crate::runtime::approval::ApprovalStore;
use crate::runtime::history::{ChatHistoryStore, InMemoryHistoryStore};
use crate::runtime::journal::ActionJournal;
use crate::runtime::runs::RunSupervisor;
use crate::runtime::runtime_config::RuntimeConfig;
use crate::runtime::session_lock::SessionLockMap;
use crate::runtime::spend::SpendGuard;
use crate::runtime::tools::ToolRegistry;
use crate::runtime::undo::UndoService;

/// Shared application state passed to every API handler and the chat loop.
///
/// Grouped by concern:
/// - **Core services** — config, LLM provider registry.
/// - **Orchestration** — run supervisor, action journal, tool registry.
/// - **Guard stack inputs** — approval store, spend guard, runtime config.
/// - **History** — the opaque `ChatHistoryStore` (non-goal: concrete
///   persistence/compaction internals live outside this crate; the
///   in-memory implementation here stands in for it).
#[derive(Clone)]
pub struct AppState {
    // ── Core services ───────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,

    // ── Orchestration ───────────────────────────────────────────────
    pub runs: Arc<RunSupervisor>,
    pub journal: Arc<ActionJournal>,
    pub tools: Arc<ToolRegistry>,
    pub undo: Arc<UndoService>,
    pub session_locks: Arc<SessionLockMap>,

    // ── Guard stack ─────────────────────────────────────────────────
    pub approvals: Arc<ApprovalStore>,
    pub spend: Arc<SpendGuard>,
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    // ── History (non-goal boundary) ─────────────────────────────────
    pub history: Arc<dyn ChatHistoryStore>,

    /// SHA-256 digest of the configured API bearer token, read once at
    /// boot (config takes priority over `server.api_token_env`). `None`
    /// means auth is disabled.
    pub api_token_hash: Option<Arc<[u8]>>,

    /// Daemon-wide operation mode gate: `true` is `normal`. Flipped by
    /// daemon-lifecycle management (service install/upgrade/maintenance
    /// windows) — out of scope here — and read by `POST chat`'s pre-flight
    /// check, which rejects with HTTP 423 while it's `false`. No RPC in
    /// this crate ever clears it; it exists so the check is real rather
    /// than a permanent no-op.
    pub daemon_normal: Arc<AtomicBool>,
}

impl AppState {
    /// Assemble `AppState` from a loaded, validated `Config`.
    pub fn new(config: Config) -> sa_domain::error::Result<Self> {
        let llm = ProviderRegistry::from_config(&config.llm)?;

        let runtime_config = RuntimeConfig::from_boot_config(&config);
        let journal = Arc::new(ActionJournal::new());
        let tools = Arc::new(ToolRegistry::with_builtins());
        let undo = Arc::new(UndoService::new(journal.clone(), tools.build_reverse_handlers()));
        let api_token_hash = resolve_api_token_hash(&config);

        Ok(Self {
            runs: Arc::new(RunSupervisor::new()),
            journal,
            tools,
            undo,
            session_locks: Arc::new(SessionLockMap::new()),
            approvals: Arc::new(ApprovalStore::new(std::time::Duration::from_secs(300))),
            spend: Arc::new(SpendGuard::new(config.economy.clone())),
            runtime_config: Arc::new(RwLock::new(runtime_config)),
            history: Arc::new(InMemoryHistoryStore::new()),
            llm: Arc::new(llm),
            config: Arc::new(config),
            api_token_hash,
            daemon_normal: Arc::new(AtomicBool::new(true)),
        })
    }
}

/// Priority: `config.server.api_token` > `$<config.server.api_token_env>`.
/// Logs which source won (or that auth is disabled) but never logs the
/// token itself.
fn resolve_api_token_hash(config: &Config) -> Option<Arc<[u8]>> {
    use sha2::{Digest, Sha256};

    let env_var = &config.server.api_token_env;
    let token = config
        .server
        .api_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| ("config".to_string(), t.to_string()))
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .filter(|t| !t.is_empty())
                .map(|t| (format!("env:{env_var}"), t))
        });

    match token {
        Some((source, t)) => {
            tracing::info!(source = %source, "API bearer-token auth enabled");
            Some(Arc::from(Sha256::digest(t.as_bytes()).to_vec().into_boxed_slice()))
        }
        None => {
            tracing::warn!(
                "API bearer-token auth DISABLED — set server.api_token in config.toml or {env_var} env var"
            );
            None
        }
    }
}
