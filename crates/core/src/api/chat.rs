//! HTTP handlers for the chat surface: the inbound RPCs layered
//! directly over the Chat Loop, Run Supervisor, Guard Stack, Undo Service,
//! and Action Journal in `crate::runtime`.

use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use sa_domain::config::ApprovalMode;

use crate::runtime::journal::{ActionFilter, ToolCategory};
use crate::runtime::runtime_config::{RunMode, RuntimeConfig, ThinkingLevel, ThinkingVisibility};
use crate::runtime::turn::{run_turn, TurnInput};
use crate::state::AppState;

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "error": message.into(), "code": code })),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub message: String,
    pub session_id: Option<String>,
    /// No agent registry survives the trim (non-goal boundary) — accepted
    /// for wire compatibility and otherwise ignored.
    pub agent_id: Option<String>,
    pub model: Option<String>,
    pub attachments: Option<Vec<Attachment>>,
    /// The swarm tool is an opaque `Tool` plugin (non-goal); accepted and
    /// ignored rather than rejected, so a client that always sends it
    /// doesn't get a spurious 400.
    pub swarm_mode: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct Attachment {
    pub name: Option<String>,
    #[serde(flatten)]
    pub rest: Value,
}

fn validate_attachments(attachments: &[Attachment]) -> Result<(), ApiError> {
    for a in attachments {
        if a.name.as_deref().unwrap_or("").is_empty() {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "CHAT_ATTACHMENT_INVALID",
                "attachment missing a non-empty name",
            ));
        }
    }
    Ok(())
}

/// `POST chat` — opens the run and streams `RunEvent`s as SSE frames
/// ending with the `[DONE]` sentinel.
pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if !state.daemon_normal.load(Ordering::Acquire) {
        return Err(api_error(
            StatusCode::LOCKED,
            "DAEMON_OPERATION_MODE_BLOCK",
            "daemon operation mode is not normal",
        ));
    }
    if body.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "CHAT_MESSAGE_EMPTY", "message must not be empty"));
    }
    if let Some(attachments) = &body.attachments {
        validate_attachments(attachments)?;
    }

    {
        let runtime = state.runtime_config.read();
        let status = state.spend.status(runtime.daily_budget_usd, runtime.auto_pause_on_limit);
        if crate::runtime::guards::precheck_spend(&status, runtime.spend_paused).is_err() {
            return Err(api_error(
                StatusCode::TOO_MANY_REQUESTS,
                "CHAT_SPEND_LIMIT_REACHED",
                format!(
                    "spend limit reached: {:.4}/{:.4}",
                    status.spent_24h,
                    status.daily_budget_usd.unwrap_or(0.0)
                ),
            ));
        }
    }

    let session_id = body.session_id.unwrap_or_else(|| format!("session-{}", Uuid::new_v4()));

    // Acquired before the run is spawned (not inside the stream below) so a
    // second `POST chat` on the same session actually waits for this one to
    // finish rather than racing it — only one in-flight run per sessionId
    // is expected. Held for the stream's lifetime.
    let permit = state
        .session_locks
        .acquire(&session_id)
        .await
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, "CHAT_SESSION_BUSY", e.to_string()))?;

    let input = TurnInput {
        session_id: session_id.clone(),
        message: body.message,
        model: body.model,
    };

    let (_run_id, mut rx) = run_turn(state, input);

    let stream = async_stream::stream! {
        let _permit = permit;

        while let Some(event) = rx.recv().await {
            let body = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            yield Ok(Event::default().data(body));
        }
        yield Ok(Event::default().data("[DONE]"));
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("heartbeat")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST chat/abort
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AbortBody {
    pub run_id: Option<String>,
    pub session_id: Option<String>,
}

pub async fn abort(State(state): State<AppState>, Json(body): Json<AbortBody>) -> impl IntoResponse {
    let cancelled = if let Some(run_id) = &body.run_id {
        usize::from(state.runs.abort_run(run_id))
    } else if let Some(session_id) = &body.session_id {
        state.runs.abort_session(session_id)
    } else {
        state.runs.abort_all()
    };
    Json(serde_json::json!({ "cancelled": cancelled }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST chat/approve
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBody {
    pub id: Uuid,
    pub approved: bool,
    pub allow_always: Option<bool>,
    pub reason: Option<String>,
}

pub async fn approve(State(state): State<AppState>, Json(body): Json<ApproveBody>) -> Result<impl IntoResponse, ApiError> {
    let resolved = if body.approved {
        state.approvals.approve(&body.id, body.allow_always.unwrap_or(false))
    } else {
        state.approvals.deny(&body.id, body.reason)
    };

    if resolved {
        Ok(Json(serde_json::json!({ "resolved": true })))
    } else {
        Err(api_error(StatusCode::NOT_FOUND, "APPROVAL_NOT_FOUND", "no pending approval with that id"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET/POST chat/approval-mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalModeView {
    pub approval_mode: ApprovalMode,
    pub bypass_all_permissions: bool,
    pub locked: bool,
}

pub async fn get_approval_mode(State(state): State<AppState>) -> Json<ApprovalModeView> {
    let runtime = state.runtime_config.read();
    Json(ApprovalModeView {
        approval_mode: runtime.approval_mode,
        bypass_all_permissions: runtime.bypass_all_permissions,
        locked: runtime.bypass_all_permissions,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetApprovalModeBody {
    pub approval_mode: ApprovalMode,
}

pub async fn set_approval_mode(
    State(state): State<AppState>,
    Json(body): Json<SetApprovalModeBody>,
) -> Result<Json<ApprovalModeView>, ApiError> {
    let mut runtime = state.runtime_config.write();
    if runtime.bypass_all_permissions {
        return Err(api_error(
            StatusCode::CONFLICT,
            "APPROVAL_MODE_LOCKED",
            "approval mode is locked while bypassAllPermissions is set",
        ));
    }
    runtime.approval_mode = body.approval_mode;
    Ok(Json(ApprovalModeView {
        approval_mode: runtime.approval_mode,
        bypass_all_permissions: runtime.bypass_all_permissions,
        locked: false,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET/POST chat/run-config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfigView {
    pub mode: RunMode,
    pub max_iterations: u32,
    pub economy_mode: bool,
    pub daily_budget_usd: Option<f64>,
    pub spend_paused: bool,
    pub allow_irreversible_actions: bool,
    pub effective_max_iterations: u32,
}

fn run_config_view(runtime: &RuntimeConfig, economy_cap: Option<u32>) -> RunConfigView {
    RunConfigView {
        mode: runtime.mode,
        max_iterations: runtime.max_iterations,
        economy_mode: runtime.economy_mode,
        daily_budget_usd: runtime.daily_budget_usd,
        spend_paused: runtime.spend_paused,
        allow_irreversible_actions: runtime.allow_irreversible_actions,
        effective_max_iterations: runtime.effective_max_iterations(economy_cap),
    }
}

pub async fn get_run_config(State(state): State<AppState>) -> Json<RunConfigView> {
    Json(run_config_view(&state.runtime_config.read(), state.config.economy.max_iterations_cap))
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatchRunConfigBody {
    pub mode: Option<RunMode>,
    pub max_iterations: Option<u32>,
    pub economy_mode: Option<bool>,
    pub daily_budget_usd: Option<f64>,
    pub spend_paused: Option<bool>,
    pub allow_irreversible_actions: Option<bool>,
}

pub async fn patch_run_config(State(state): State<AppState>, Json(body): Json<PatchRunConfigBody>) -> Json<RunConfigView> {
    let mut runtime = state.runtime_config.write();
    if let Some(mode) = body.mode {
        runtime.mode = mode;
    }
    if let Some(v) = body.max_iterations {
        runtime.max_iterations = v;
    }
    if let Some(v) = body.economy_mode {
        runtime.economy_mode = v;
    }
    if let Some(v) = body.daily_budget_usd {
        runtime.daily_budget_usd = Some(v);
    }
    if let Some(v) = body.spend_paused {
        runtime.spend_paused = v;
    }
    if let Some(v) = body.allow_irreversible_actions {
        runtime.allow_irreversible_actions = v;
    }
    Json(run_config_view(&runtime, state.config.economy.max_iterations_cap))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET/POST chat/thinking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
pub struct ThinkingView {
    pub level: ThinkingLevel,
    pub visibility: ThinkingVisibility,
}

pub async fn get_thinking(State(state): State<AppState>) -> Json<ThinkingView> {
    let runtime = state.runtime_config.read();
    Json(ThinkingView {
        level: runtime.thinking.level,
        visibility: runtime.thinking.visibility,
    })
}

#[derive(Debug, Deserialize, Default)]
pub struct PatchThinkingBody {
    pub level: Option<ThinkingLevel>,
    pub visibility: Option<ThinkingVisibility>,
}

pub async fn patch_thinking(State(state): State<AppState>, Json(body): Json<PatchThinkingBody>) -> Json<ThinkingView> {
    let mut runtime = state.runtime_config.write();
    if let Some(level) = body.level {
        runtime.thinking.level = level;
    }
    if let Some(visibility) = body.visibility {
        runtime.thinking.visibility = visibility;
    }
    Json(ThinkingView {
        level: runtime.thinking.level,
        visibility: runtime.thinking.visibility,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST chat/undo
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct UndoBody {
    pub action: String,
    pub id: Option<u64>,
    pub count: Option<usize>,
}

pub async fn undo(State(state): State<AppState>, Json(body): Json<UndoBody>) -> Result<Json<Value>, ApiError> {
    let value = match body.action.as_str() {
        "list" => serde_json::json!({
            "undoable": state.journal.list_undoable(),
            "redoable": state.journal.list_redoable(),
        }),
        "undo_one" => {
            let Some(id) = body.id else {
                return Err(api_error(StatusCode::BAD_REQUEST, "UNDO_ID_REQUIRED", "undo_one requires an id"));
            };
            serde_json::to_value(state.undo.undo_one(id).await).unwrap_or(Value::Null)
        }
        "undo_last" => serde_json::to_value(state.undo.undo_last_n(body.count.unwrap_or(1)).await).unwrap_or(Value::Null),
        "undo_all" => serde_json::to_value(state.undo.undo_all().await).unwrap_or(Value::Null),
        "redo_one" => {
            let Some(id) = body.id else {
                return Err(api_error(StatusCode::BAD_REQUEST, "UNDO_ID_REQUIRED", "redo_one requires an id"));
            };
            serde_json::to_value(state.undo.redo_one(id).await).unwrap_or(Value::Null)
        }
        "redo_last" => serde_json::to_value(state.undo.redo_last_n(body.count.unwrap_or(1)).await).unwrap_or(Value::Null),
        "redo_all" => serde_json::to_value(state.undo.redo_all().await).unwrap_or(Value::Null),
        other => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "UNDO_ACTION_UNKNOWN",
                format!("unknown undo action: {other}"),
            ))
        }
    };
    Ok(Json(value))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET chat/actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ACTIONS_DEFAULT_LIMIT: usize = 100;

#[derive(Debug, Deserialize, Default)]
pub struct ActionsQuery {
    pub run_id: Option<String>,
    pub category: Option<String>,
    pub undoable: Option<bool>,
    pub limit: Option<usize>,
}

pub async fn actions(State(state): State<AppState>, Query(query): Query<ActionsQuery>) -> Json<Value> {
    let category = query.category.as_deref().and_then(|s| match s {
        "read" => Some(ToolCategory::Read),
        "mutate" => Some(ToolCategory::Mutate),
        "exec" => Some(ToolCategory::Exec),
        "meta" => Some(ToolCategory::Meta),
        _ => None,
    });

    let mut records = state.journal.list(&ActionFilter {
        run_id: query.run_id,
        category,
        undoable: query.undoable,
    });
    records.sort_by_key(|r| std::cmp::Reverse(r.started_at));
    records.truncate(query.limit.unwrap_or(ACTIONS_DEFAULT_LIMIT));

    Json(serde_json::json!({ "actions": records }))
}
