//! Chat Loop: the per-run iteration that ties the Context Preparer,
//! Provider Adapter, Guard Stack, Tool Registry, Undo Service, and Action
//! Journal together into one streamed turn.
//!
//! Entry point: [`run_turn`] spawns the loop in the background and hands the
//! caller a channel of [`TurnEvent`]s (an alias for [`RunEvent`]) to drive
//! SSE or to drain for a non-streaming response.

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use sa_domain::error::Error as DomainError;
use sa_domain::stream::StreamEvent;
use sa_domain::tool::{Message, ToolCall};

use crate::runtime::cancel::CancelToken;
use crate::runtime::directives::{self, Directive};
use crate::runtime::events::{EventGate, RunEvent};
use crate::runtime::guards::{self, GuardVerdict};
use crate::runtime::journal::{ActionApproval, ActionDraft, ActionFilter, ActionOutcome, ToolCategory};
use crate::runtime::runtime_config::{RuntimeConfig, ThinkingVisibility};
use crate::runtime::{self, compact};
use crate::state::AppState;

pub use crate::runtime::events::RunEvent as TurnEvent;

const TOOL_RESULT_LIMIT: usize = 4000;
const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

/// Input to a single turn. `session_id` is the conversation the history
/// store and compaction operate over; the run itself is tracked separately
/// under an allocated `run_id`.
pub struct TurnInput {
    pub session_id: String,
    pub message: String,
    /// `"<provider>/<model>"` override, e.g. from an explicit API field.
    pub model: Option<String>,
}

/// Run one turn: parse directives, then iterate the Context Preparer ->
/// Provider Adapter -> Guard Stack -> Tool Registry cycle until the model
/// stops requesting tools, the iteration cap is hit, or the run is
/// cancelled. Returns the allocated `run_id` and a receiver of events.
pub fn run_turn(state: AppState, input: TurnInput) -> (String, mpsc::Receiver<TurnEvent>) {
    let (tx, rx) = mpsc::channel::<TurnEvent>(64);
    let gate = Arc::new(EventGate::new());

    let max_iterations = state.runtime_config.read().effective_max_iterations(state.config.economy.max_iterations_cap);
    let (run_id, cancel) = state.runs.register(&input.session_id, max_iterations);
    let run_id_for_task = run_id.clone();

    tokio::spawn(async move {
        send(&tx, &gate, RunEvent::RunStart { run_id: run_id_for_task.clone() }).await;
        send(&tx, &gate, RunEvent::SessionInfo { session_id: input.session_id.clone() }).await;

        run_turn_inner(&state, input, &tx, &gate, &cancel, &run_id_for_task).await;

        state.runs.finish(&run_id_for_task);
        state.approvals.clear_run(&run_id_for_task);
    });

    (run_id, rx)
}

async fn send(tx: &mpsc::Sender<TurnEvent>, gate: &EventGate, event: RunEvent) {
    if gate.emit(&event).is_some() {
        let _ = tx.send(event).await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pre-flight: directives
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Apply a directive against the live runtime config / history store,
/// returning `(name, description)` for the `directive_applied` event.
async fn apply_directive(state: &AppState, session_id: &str, directive: &Directive) -> (String, Option<String>) {
    match directive {
        Directive::Think(level) => {
            state.runtime_config.write().thinking.level = *level;
            (
                "think".to_string(),
                Some(format!("thinking level set to {level:?}").to_lowercase()),
            )
        }
        Directive::Model(spec) => ("model".to_string(), Some(format!("model override set to {spec}"))),
        Directive::Reset => {
            let _ = state.history.clear(session_id).await;
            ("reset".to_string(), Some("conversation history cleared".to_string()))
        }
        Directive::Status => {
            let runtime = state.runtime_config.read().clone();
            let spend = state.spend.status(runtime.daily_budget_usd, runtime.auto_pause_on_limit);
            (
                "status".to_string(),
                Some(format!(
                    "mode={:?} approval={:?} maxIterations={} spent24h={:.4} budget={:?}",
                    runtime.mode, runtime.approval_mode, runtime.max_iterations, spend.spent_24h, spend.daily_budget_usd,
                )),
            )
        }
        Directive::Help => (
            "help".to_string(),
            Some("available directives: /think <off|low|medium|high>, /model <provider/model>, /reset, /status, /help".to_string()),
        ),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Main loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn_inner(
    state: &AppState,
    input: TurnInput,
    tx: &mpsc::Sender<TurnEvent>,
    gate: &EventGate,
    cancel: &CancelToken,
    run_id: &str,
) {
    // ── Step 1: directive parsing ────────────────────────────────────
    let parsed = directives::parse(&input.message);
    let mut model_override = input.model.clone();

    for directive in &parsed.directives {
        if let Directive::Model(spec) = directive {
            model_override = Some(spec.clone());
        }
        let (name, value) = apply_directive(state, &input.session_id, directive).await;
        send(tx, gate, RunEvent::DirectiveApplied { directive: name, value }).await;
    }
    for unknown in &parsed.unknown {
        send(
            tx,
            gate,
            RunEvent::Warning {
                code: "unknown_directive".to_string(),
                message: format!("unrecognized directive: {}", unknown.raw),
            },
        )
        .await;
    }

    if parsed.is_directives_only() {
        send(tx, gate, RunEvent::Done { content: String::new(), iterations: 0 }).await;
        return;
    }

    // ── Pre-flight: spend precheck ───────────────────────────────────
    {
        let runtime = state.runtime_config.read().clone();
        let status = state.spend.status(runtime.daily_budget_usd, runtime.auto_pause_on_limit);
        if guards::precheck_spend(&status, runtime.spend_paused).is_err() {
            send(
                tx,
                gate,
                RunEvent::Error {
                    message: DomainError::SpendLimitReached {
                        spent_usd: status.spent_24h,
                        budget_usd: status.daily_budget_usd.unwrap_or(0.0),
                    }
                    .to_string(),
                },
            )
            .await;
            return;
        }
    }

    let user_text = parsed.remaining.clone();
    if state.history.append(&input.session_id, &[Message::user(&user_text)]).await.is_err() {
        send(tx, gate, RunEvent::Error { message: "failed to persist user message to history".into() }).await;
        return;
    }

    // ── Iteration loop ────────────────────────────────────────────────
    let mut iteration: u32 = 0;
    let mut reached_cap = true;

    'outer: loop {
        let runtime = state.runtime_config.read().clone();
        if !guards::within_iteration_cap(&runtime, iteration, state.config.economy.max_iterations_cap) {
            break;
        }

        if cancel.is_cancelled() {
            send(tx, gate, RunEvent::Aborted { reason: "cancelled by user".into() }).await;
            reached_cap = false;
            break;
        }

        state.runs.set_iteration(run_id, iteration);
        let effective_max_iterations = runtime.effective_max_iterations(state.config.economy.max_iterations_cap);
        send(tx, gate, RunEvent::Progress { iteration, max_iterations: effective_max_iterations }).await;

        // ── Context Preparer ─────────────────────────────────────────
        let mut history = match state.history.load(&input.session_id).await {
            Ok(h) => h,
            Err(e) => {
                send(tx, gate, RunEvent::Error { message: format!("failed to load history: {e}") }).await;
                reached_cap = false;
                break;
            }
        };

        if compact::should_compact(&history, &state.config.compaction, &state.config.economy) {
            let before = history.len();
            if let Some(provider) = runtime::resolve_summarizer(state) {
                match compact::run_compaction(provider.as_ref(), state.history.as_ref(), &input.session_id, &history, &state.config.compaction).await {
                    Ok(_) => {
                        history = state.history.load(&input.session_id).await.unwrap_or(history);
                        send(tx, gate, RunEvent::Compaction { messages_before: before, messages_after: history.len() }).await;
                    }
                    Err(e) => tracing::warn!(error = %e, "compaction failed, continuing with full history"),
                }
            }
        }

        let (provider, provider_id, model) = match runtime::resolve_provider(state, model_override.as_deref()) {
            Ok((p, model_name)) => {
                let pid = p.provider_id().to_string();
                let model = model_name.unwrap_or_else(|| "default".to_string());
                (p, pid, model)
            }
            Err(e) => {
                send(tx, gate, RunEvent::Error { message: e.to_string() }).await;
                reached_cap = false;
                break;
            }
        };

        let tool_digest = state
            .tools
            .definitions()
            .iter()
            .map(|d| format!("- {}: {}", d.name, d.description))
            .collect::<Vec<_>>()
            .join("\n");
        let system_prompt = runtime::build_system_context(state, &provider_id, &model, &tool_digest);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(&system_prompt));
        messages.extend(history);

        let req = sa_providers::ChatRequest {
            messages,
            tools: state.tools.definitions(),
            temperature: Some(0.2),
            max_tokens: None,
            json_mode: false,
            model: model_override.clone(),
        };

        // ── Provider Adapter with fallback ───────────────────────────
        let candidates = provider_candidates(state, &provider_id, provider.clone());
        let mut stream = None;
        let mut fatal_error: Option<DomainError> = None;
        for (candidate_id, candidate) in candidates {
            match candidate.chat_stream(req.clone()).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) if e.is_retryable() => {
                    send(tx, gate, RunEvent::Fallback { failed_model: candidate_id.clone(), error: e.to_string() }).await;
                    fatal_error = Some(e);
                    continue;
                }
                Err(e) => {
                    fatal_error = Some(e);
                    break;
                }
            }
        }

        let Some(mut stream) = stream else {
            let message = fatal_error.map(|e| e.to_string()).unwrap_or_else(|| "no LLM provider available".into());
            send(tx, gate, RunEvent::Error { message }).await;
            reached_cap = false;
            break;
        };

        // ── Stream consumption ───────────────────────────────────────
        let mut splitter = ThinkSplitter::new();
        let mut text_buf = String::new();
        let mut thinking_buf = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        let mut usage = None;
        let mut was_cancelled = false;
        let mut stream_error = None;

        while let Some(event) = stream.next().await {
            if cancel.is_cancelled() {
                was_cancelled = true;
                break;
            }
            match event {
                Ok(StreamEvent::Token { text }) => {
                    for (is_thinking, chunk) in splitter.feed(&text) {
                        emit_think_segment(tx, gate, &runtime, is_thinking, chunk, &mut text_buf, &mut thinking_buf).await;
                    }
                }
                Ok(StreamEvent::ToolCallFinished { call_id, tool_name, arguments }) => {
                    tool_calls.push(ToolCall { call_id, tool_name, arguments });
                }
                Ok(StreamEvent::ToolCallStarted { .. }) | Ok(StreamEvent::ToolCallDelta { .. }) => {}
                Ok(StreamEvent::Done { usage: u, .. }) => usage = u,
                Ok(StreamEvent::Error { message }) => {
                    stream_error = Some(message);
                    break;
                }
                Err(e) => {
                    stream_error = Some(e.to_string());
                    break;
                }
            }
        }
        if let Some((is_thinking, chunk)) = splitter.flush() {
            emit_think_segment(tx, gate, &runtime, is_thinking, chunk, &mut text_buf, &mut thinking_buf).await;
        }
        if runtime.effective_thinking().visibility == ThinkingVisibility::On && !thinking_buf.is_empty() {
            send(tx, gate, RunEvent::Thinking { text: thinking_buf.clone(), streaming: false }).await;
        }

        if was_cancelled {
            send(tx, gate, RunEvent::Aborted { reason: "cancelled during streaming".into() }).await;
            reached_cap = false;
            break;
        }
        if let Some(message) = stream_error {
            send(tx, gate, RunEvent::Error { message }).await;
            reached_cap = false;
            break;
        }

        if let Some(u) = &usage {
            send(
                tx,
                gate,
                RunEvent::Usage { prompt_tokens: u.prompt_tokens, completion_tokens: u.completion_tokens, total_tokens: u.total_tokens },
            )
            .await;

            if let Some(pricing) = state.config.llm.pricing.get(&model) {
                state.spend.record_charge(pricing.estimate_cost(u.prompt_tokens, u.completion_tokens));
            }
        }

        // ── Post-stream spend re-check ────────────────────────────────
        {
            let status = state.spend.status(runtime.daily_budget_usd, runtime.auto_pause_on_limit);
            if guards::precheck_spend(&status, runtime.spend_paused).is_err() {
                send(
                    tx,
                    gate,
                    RunEvent::Warning {
                        code: "spend_limit_reached".into(),
                        message: format!("spend limit reached after this call: {:.4}/{:.4}", status.spent_24h, status.daily_budget_usd.unwrap_or(0.0)),
                    },
                )
                .await;
                let _ = state.history.append(&input.session_id, &[Message::assistant(&text_buf)]).await;
                send(tx, gate, RunEvent::Done { content: text_buf, iterations: iteration + 1 }).await;
                reached_cap = false;
                break;
            }
        }

        // ── No tool calls: this is the final answer ──────────────────
        if tool_calls.is_empty() {
            let _ = state.history.append(&input.session_id, &[Message::assistant(&text_buf)]).await;
            send(tx, gate, RunEvent::Done { content: text_buf, iterations: iteration + 1 }).await;
            reached_cap = false;
            break;
        }

        let assistant_msg = runtime::build_assistant_tool_message(&text_buf, &tool_calls);
        let _ = state.history.append(&input.session_id, &[assistant_msg]).await;

        // ── Tool dispatch, sequential ────────────────────────────────
        let mut only_polls = true;
        for tc in &tool_calls {
            if tc.tool_name != "process.poll" {
                only_polls = false;
            }

            if cancel.is_cancelled() {
                send(tx, gate, RunEvent::Aborted { reason: "cancelled during tool dispatch".into() }).await;
                reached_cap = false;
                break 'outer;
            }

            send(
                tx,
                gate,
                RunEvent::ToolCall { name: tc.tool_name.clone(), args: tc.arguments.clone(), iteration, max_iterations: effective_max_iterations },
            )
            .await;

            let result_value = dispatch_one_tool(state, &runtime, run_id, &input.session_id, tc, tx, gate).await;
            let (result_text, is_error) = match &result_value {
                Ok(v) => (v.to_string(), false),
                Err(e) => (e.clone(), true),
            };
            let result_limit = runtime.effective_tool_result_max_chars(TOOL_RESULT_LIMIT, state.config.economy.tool_result_max_chars);
            let truncated = runtime::truncate_str(&result_text, result_limit);

            send(tx, gate, RunEvent::ToolResult { name: tc.tool_name.clone(), result: serde_json::json!({ "content": truncated, "is_error": is_error }) }).await;

            let _ = state.history.append(&input.session_id, &[Message::tool_result(&tc.call_id, &truncated)]).await;
        }

        if gate.is_closed() {
            reached_cap = false;
            break;
        }

        // Poll-only iterations don't consume the iteration budget: a run
        // that's just watching a background process shouldn't burn down its
        // cap while nothing else happens (Open Question decision #3).
        if !only_polls {
            iteration += 1;
        }
    }

    if reached_cap {
        let runtime = state.runtime_config.read().clone();
        let effective_max_iterations = runtime.effective_max_iterations(state.config.economy.max_iterations_cap);
        send(
            tx,
            gate,
            RunEvent::Warning {
                code: "iteration_cap_reached".into(),
                message: format!("mode={:?} maxIterations={}", runtime.mode, effective_max_iterations),
            },
        )
        .await;
    }
}

/// Ordered fallback candidates: the resolved primary provider first, then
/// every other registered provider, in registration order.
fn provider_candidates(
    state: &AppState,
    primary_id: &str,
    primary: Arc<dyn sa_providers::LlmProvider>,
) -> Vec<(String, Arc<dyn sa_providers::LlmProvider>)> {
    let mut out = vec![(primary_id.to_string(), primary)];
    for (id, provider) in state.llm.iter() {
        if id != primary_id {
            out.push((id.clone(), provider.clone()));
        }
    }
    out
}

async fn emit_think_segment(
    tx: &mpsc::Sender<TurnEvent>,
    gate: &EventGate,
    runtime: &RuntimeConfig,
    is_thinking: bool,
    chunk: String,
    text_buf: &mut String,
    thinking_buf: &mut String,
) {
    if chunk.is_empty() {
        return;
    }
    if is_thinking {
        match runtime.effective_thinking().visibility {
            ThinkingVisibility::Off => {}
            ThinkingVisibility::Stream => {
                send(tx, gate, RunEvent::Thinking { text: chunk.clone(), streaming: true }).await;
                thinking_buf.push_str(&chunk);
            }
            ThinkingVisibility::On => thinking_buf.push_str(&chunk),
        }
    } else {
        send(tx, gate, RunEvent::Token { text: chunk.clone() }).await;
        text_buf.push_str(&chunk);
    }
}

/// Run the Guard Stack for one tool call, then execute it if allowed.
/// Returns `Ok(result)` or `Err(message)` — both paths seal an
/// `ActionRecord`, so a denial is recorded as a failed action rather than
/// silently dropped.
async fn dispatch_one_tool(
    state: &AppState,
    runtime: &RuntimeConfig,
    run_id: &str,
    session_id: &str,
    tc: &ToolCall,
    tx: &mpsc::Sender<TurnEvent>,
    gate: &EventGate,
) -> Result<Value, String> {
    // `undo`/`actions` are schema-only — dispatched directly against the
    // Undo Service / Action Journal rather than through the tool registry.
    if tc.tool_name == "undo" {
        return dispatch_undo(state, tc).await;
    }
    if tc.tool_name == "actions" {
        return dispatch_actions(state, tc);
    }

    // Tools with no registry spec are gated the same way as registered
    // ones — denied up front if they look mutating and irreversible
    // actions aren't allowed, otherwise routed through the same
    // approval-then-journal sequence below (category `Meta`, since an
    // unregistered tool has no declared undo/mutate classification).
    let spec = state.tools.get_spec(&tc.tool_name);

    if spec.is_none() {
        if let Some(reason) = guards::check_undo_guarantee_unregistered(runtime, &tc.tool_name) {
            let id = state.journal.record(ActionDraft {
                run_id: run_id.to_string(),
                tool: tc.tool_name.clone(),
                category: ToolCategory::Meta,
                args: tc.arguments.clone(),
                approval: ActionApproval::Denied,
                undoable: false,
            });
            state.journal.complete(id, ActionOutcome::Failure(reason.clone()), None);
            return Err(reason);
        }
    }

    let has_reversal = match (spec, tc.tool_name.as_str()) {
        (Some(_), "exec") => tc
            .arguments
            .get("command")
            .and_then(|v| v.as_str())
            .and_then(crate::runtime::tools::static_exec_reversal)
            .is_some(),
        (Some(spec), _) => spec.reverse_hint.is_some_and(|f| f(&tc.arguments).is_some()),
        (None, _) => false,
    };

    if let Some(spec) = spec {
        if let Some(reason) = guards::check_undo_guarantee(runtime, &tc.tool_name, spec, has_reversal) {
            let id = state.journal.record(ActionDraft {
                run_id: run_id.to_string(),
                tool: tc.tool_name.clone(),
                category: spec.category,
                args: tc.arguments.clone(),
                approval: ActionApproval::Denied,
                undoable: false,
            });
            state.journal.complete(id, ActionOutcome::Failure(reason.clone()), None);
            return Err(reason);
        }
    }

    let category = spec.map(|s| s.category).unwrap_or(ToolCategory::Meta);
    let undoable = spec.map(|s| s.undoable).unwrap_or(false);
    let already_auto_approved = state.approvals.is_auto_approved(run_id, &tc.tool_name);
    let verdict = guards::check_approval(runtime, category, already_auto_approved);

    let approval_status = match verdict {
        GuardVerdict::Deny(reason) => {
            let id = state.journal.record(ActionDraft {
                run_id: run_id.to_string(),
                tool: tc.tool_name.clone(),
                category,
                args: tc.arguments.clone(),
                approval: ActionApproval::Denied,
                undoable,
            });
            state.journal.complete(id, ActionOutcome::Failure(reason.clone()), None);
            return Err(reason);
        }
        GuardVerdict::RequireApproval => {
            let (respond_tx, respond_rx) = tokio::sync::oneshot::channel();
            let pending_id = uuid::Uuid::new_v4();
            state.approvals.insert(crate::runtime::approval::PendingApproval {
                id: pending_id,
                command: tc.arguments.to_string(),
                session_key: session_id.to_string(),
                run_id: run_id.to_string(),
                tool: tc.tool_name.clone(),
                created_at: chrono::Utc::now(),
                respond: respond_tx,
            });
            send(
                tx,
                gate,
                RunEvent::ApprovalPending { id: pending_id.to_string(), tool: tc.tool_name.clone(), command: tc.arguments.to_string() },
            )
            .await;

            match tokio::time::timeout(state.approvals.timeout(), respond_rx).await {
                Ok(Ok(crate::runtime::approval::ApprovalDecision::Approved)) => ActionApproval::Granted,
                Ok(Ok(crate::runtime::approval::ApprovalDecision::Denied { reason })) => {
                    let message = reason.unwrap_or_else(|| "denied by operator".to_string());
                    let id = state.journal.record(ActionDraft {
                        run_id: run_id.to_string(),
                        tool: tc.tool_name.clone(),
                        category,
                        args: tc.arguments.clone(),
                        approval: ActionApproval::Denied,
                        undoable,
                    });
                    state.journal.complete(id, ActionOutcome::Failure(message.clone()), None);
                    return Err(message);
                }
                Ok(Err(_)) | Err(_) => {
                    state.approvals.remove_expired(&pending_id);
                    let message = "approval timed out".to_string();
                    let id = state.journal.record(ActionDraft {
                        run_id: run_id.to_string(),
                        tool: tc.tool_name.clone(),
                        category,
                        args: tc.arguments.clone(),
                        approval: ActionApproval::Denied,
                        undoable,
                    });
                    state.journal.complete(id, ActionOutcome::Failure(message.clone()), None);
                    return Err(message);
                }
            }
        }
        GuardVerdict::Allow => ActionApproval::Auto,
    };

    let id = state.journal.record(ActionDraft {
        run_id: run_id.to_string(),
        tool: tc.tool_name.clone(),
        category,
        args: tc.arguments.clone(),
        approval: approval_status,
        undoable,
    });

    let result = state.tools.execute(&tc.tool_name, tc.arguments.clone()).await;
    match &result {
        Ok(value) => state.journal.complete(id, ActionOutcome::Success(value.clone()), None),
        Err(message) => state.journal.complete(id, ActionOutcome::Failure(message.clone()), None),
    };
    result
}

async fn dispatch_undo(state: &AppState, tc: &ToolCall) -> Result<Value, String> {
    let action = tc.arguments.get("action").and_then(|v| v.as_str()).unwrap_or("");
    let id = tc.arguments.get("id").and_then(|v| v.as_u64());
    let n = tc.arguments.get("n").and_then(|v| v.as_u64()).unwrap_or(1) as usize;

    let outcomes = match action {
        "undo_one" => {
            let Some(id) = id else { return Err("undo_one requires an id".into()) };
            vec![state.undo.undo_one(id).await]
        }
        "undo_last_n" => state.undo.undo_last_n(n).await,
        "undo_all" => state.undo.undo_all().await,
        "redo_one" => {
            let Some(id) = id else { return Err("redo_one requires an id".into()) };
            vec![state.undo.redo_one(id).await]
        }
        "redo_last_n" => state.undo.redo_last_n(n).await,
        "redo_all" => state.undo.redo_all().await,
        other => return Err(format!("unknown undo action: {other}")),
    };
    serde_json::to_value(outcomes).map_err(|e| e.to_string())
}

fn dispatch_actions(state: &AppState, tc: &ToolCall) -> Result<Value, String> {
    let run_id = tc.arguments.get("run_id").and_then(|v| v.as_str()).map(str::to_string);
    let category = tc.arguments.get("category").and_then(|v| v.as_str()).and_then(|s| match s {
        "read" => Some(ToolCategory::Read),
        "mutate" => Some(ToolCategory::Mutate),
        "exec" => Some(ToolCategory::Exec),
        "meta" => Some(ToolCategory::Meta),
        _ => None,
    });
    let undoable = tc.arguments.get("undoable").and_then(|v| v.as_bool());

    let records = state.journal.list(&ActionFilter { run_id, category, undoable });
    serde_json::to_value(records).map_err(|e| e.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inline `<think>...</think>` tag splitter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Splits raw token text around `<think>`/`</think>` markers, carrying a
/// partial tag across chunk boundaries so a tag split mid-stream isn't
/// mistaken for ordinary text.
struct ThinkSplitter {
    in_thinking: bool,
    carry: String,
}

impl ThinkSplitter {
    fn new() -> Self {
        Self { in_thinking: false, carry: String::new() }
    }

    fn feed(&mut self, chunk: &str) -> Vec<(bool, String)> {
        self.carry.push_str(chunk);
        let mut out = Vec::new();
        loop {
            let tag = if self.in_thinking { CLOSE_TAG } else { OPEN_TAG };
            match self.carry.find(tag) {
                Some(idx) => {
                    if idx > 0 {
                        out.push((self.in_thinking, self.carry[..idx].to_string()));
                    }
                    self.carry.drain(..idx + tag.len());
                    self.in_thinking = !self.in_thinking;
                }
                None => {
                    let hold = longest_tag_prefix_suffix(&self.carry, tag);
                    let emit_len = self.carry.len() - hold;
                    if emit_len > 0 {
                        out.push((self.in_thinking, self.carry[..emit_len].to_string()));
                        self.carry.drain(..emit_len);
                    }
                    break;
                }
            }
        }
        out
    }

    fn flush(&mut self) -> Option<(bool, String)> {
        if self.carry.is_empty() {
            None
        } else {
            Some((self.in_thinking, std::mem::take(&mut self.carry)))
        }
    }
}

/// Length of the longest proper prefix of `tag` that `s` ends with — the
/// part of `s` that might still turn into `tag` once more text arrives.
fn longest_tag_prefix_suffix(s: &str, tag: &str) -> usize {
    let max = tag.len().saturating_sub(1).min(s.len());
    for len in (1..=max).rev() {
        if s.is_char_boundary(s.len() - len) && s.ends_with(&tag[..len]) {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splitter_passes_plain_text_through() {
        let mut s = ThinkSplitter::new();
        let out = s.feed("hello world");
        assert_eq!(out, vec![(false, "hello world".to_string())]);
    }

    #[test]
    fn splitter_extracts_thinking_block() {
        let mut s = ThinkSplitter::new();
        let out = s.feed("before <think>reasoning</think> after");
        assert_eq!(
            out,
            vec![(false, "before ".to_string()), (true, "reasoning".to_string()), (false, " after".to_string())]
        );
    }

    #[test]
    fn splitter_handles_tag_split_across_chunks() {
        let mut s = ThinkSplitter::new();
        let mut out = s.feed("before <thi");
        out.extend(s.feed("nk>reasoning</think> after"));
        assert_eq!(
            out,
            vec![(false, "before ".to_string()), (true, "reasoning".to_string()), (false, " after".to_string())]
        );
    }

    #[test]
    fn splitter_flush_emits_remaining_carry() {
        let mut s = ThinkSplitter::new();
        let _ = s.feed("tail <thi");
        let flushed = s.flush();
        assert_eq!(flushed, Some((false, "tail <thi".to_string())));
    }

    #[test]
    fn longest_tag_prefix_suffix_finds_partial_open_tag() {
        assert_eq!(longest_tag_prefix_suffix("hello <thi", OPEN_TAG), 4);
        assert_eq!(longest_tag_prefix_suffix("hello world", OPEN_TAG), 0);
    }
}
