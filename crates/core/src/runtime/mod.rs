//! Core runtime — Action Journal, Undo Service, Guard Stack, Tool Registry,
//! Run Supervisor, and the Chat Loop that ties them together into one
//! deterministic per-run iteration.
//!
//! Entry point: [`run_turn`] takes a session + user message and returns a
//! stream of [`TurnEvent`]s suitable for SSE or non-streaming aggregation.

pub mod approval;
pub mod cancel;
pub mod compact;
pub mod directives;
pub mod events;
pub mod guards;
pub mod history;
pub mod journal;
pub mod runs;

pub mod runtime_config;
pub mod session_lock;
pub mod spend;
pub mod tools;
pub mod turn;
pub mod undo;

pub use turn::{run_turn, TurnEvent, TurnInput};

use std::sync::Arc;

use sa_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall};

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Provider resolution order, request-scoped to global (no sub-agent or
/// session scoping — this repo has no sub-agent concept):
/// 1. Explicit model override (`"<provider>/<model>"`, from the API request).
/// 2. The `executor` role's configured provider.
/// 3. Any available provider.
pub(super) fn resolve_provider(
    state: &AppState,
    model_override: Option<&str>,
) -> sa_domain::error::Result<(Arc<dyn sa_providers::LlmProvider>, Option<String>)> {
    if let Some(spec) = model_override {
        let provider_id = spec.split('/').next().unwrap_or(spec);
        if let Some(p) = state.llm.get(provider_id) {
            let model_name = spec.split_once('/').map(|(_, m)| m.to_string());
            return Ok((p, model_name));
        }
    }

    if let Some(p) = state.llm.for_role("executor") {
        let model_name = state.llm.model_for_role("executor").map(|m| m.to_string());
        return Ok((p, model_name));
    }

    if let Some((_, p)) = state.llm.iter().next() {
        return Ok((p.clone(), None));
    }

    Err(sa_domain::error::Error::Config(
        "no LLM providers available: configure at least one provider under [llm.providers]"
            .into(),
    ))
}

/// Resolve the "summarizer" role provider for compaction. Falls back to
/// executor, then to any available provider.
pub(super) fn resolve_summarizer(state: &AppState) -> Option<Arc<dyn sa_providers::LlmProvider>> {
    state
        .llm
        .for_role("summarizer")
        .or_else(|| state.llm.for_role("executor"))
        .or_else(|| state.llm.iter().next().map(|(_, p)| p.clone()))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context Preparer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Step 2 of the Context Preparer: render the system prompt fresh on every
/// iteration so it always reflects the live runtime snapshot (model,
/// provider, economy mode, undo-guarantee flag) rather than a value frozen
/// at session start.
pub(super) fn build_system_context(
    state: &AppState,
    provider_id: &str,
    model: &str,
    tool_digest: &str,
) -> String {
    let runtime = state.runtime_config.read();
    let economy_note = if runtime.economy_mode {
        "Economy mode is ON: tool results and context are aggressively trimmed, thinking is disabled."
    } else {
        "Economy mode is off."
    };
    let undo_note = if runtime.allow_irreversible_actions {
        "Irreversible actions are allowed without a reversal plan."
    } else {
        "Only tools with a registered reversal plan (or on the static safe-list) may mutate state."
    };

    format!(
        "You are an autonomous coding and operations assistant.\n\
         Provider: {provider_id}\n\
         Model: {model}\n\
         OS: {os}\n\
         Architecture: {arch}\n\
         {economy_note}\n\
         {undo_note}\n\n\
         Available tools:\n{tool_digest}",
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
    )
}

/// Build the assistant message carrying both free text and any tool calls
/// the model emitted this iteration, in the canonical wire shape.
pub(super) fn build_assistant_tool_message(text: &str, tool_calls: &[ToolCall]) -> Message {
    let mut parts = Vec::new();

    if !text.is_empty() {
        parts.push(ContentPart::Text {
            text: text.to_string(),
        });
    }

    for tc in tool_calls {
        parts.push(ContentPart::ToolUse {
            id: tc.call_id.clone(),
            name: tc.tool_name.clone(),
            input: tc.arguments.clone(),
        });
    }

    Message {
        role: Role::Assistant,
        content: MessageContent::Parts(parts),
    }
}

pub(super) fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── truncate_str ───────────────────────────────────────────────

    #[test]
    fn truncate_str_empty() {
        assert_eq!(truncate_str("", 10), "");
    }

    #[test]
    fn truncate_str_within_limit() {
        assert_eq!(truncate_str("hello", 10), "hello");
    }

    #[test]
    fn truncate_str_exact_boundary() {
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn truncate_str_ascii_over_limit() {
        assert_eq!(truncate_str("hello world", 5), "hello...");
    }

    #[test]
    fn truncate_str_multibyte_utf8_no_split() {
        let s = "h\u{00e9}llo"; // "héllo" — 6 bytes total
        let result = truncate_str(s, 2);
        assert_eq!(result, "h...");
    }

    #[test]
    fn truncate_str_emoji_boundary() {
        let s = "\u{1F600}abc"; // "😀abc" — 4 + 3 = 7 bytes
        let result = truncate_str(s, 3);
        assert_eq!(result, "...");
    }

    #[test]
    fn truncate_str_max_zero() {
        let result = truncate_str("abc", 0);
        assert_eq!(result, "...");
    }

    // ── build_assistant_tool_message ───────────────────────────────

    #[test]
    fn build_tool_msg_text_only() {
        let msg = build_assistant_tool_message("hello", &[]);
        assert_eq!(msg.role, Role::Assistant);
        match &msg.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 1);
                match &parts[0] {
                    ContentPart::Text { text } => assert_eq!(text, "hello"),
                    _ => panic!("expected Text part"),
                }
            }
            _ => panic!("expected Parts content"),
        }
    }

    #[test]
    fn build_tool_msg_tool_calls_only() {
        let calls = vec![ToolCall {
            call_id: "tc_1".into(),
            tool_name: "search".into(),
            arguments: serde_json::json!({"query": "test"}),
        }];
        let msg = build_assistant_tool_message("", &calls);
        match &msg.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 1);
                match &parts[0] {
                    ContentPart::ToolUse { id, name, input } => {
                        assert_eq!(id, "tc_1");
                        assert_eq!(name, "search");
                        assert_eq!(input, &serde_json::json!({"query": "test"}));
                    }
                    _ => panic!("expected ToolUse part"),
                }
            }
            _ => panic!("expected Parts content"),
        }
    }

    #[test]
    fn build_tool_msg_text_and_tools() {
        let calls = vec![
            ToolCall {
                call_id: "tc_a".into(),
                tool_name: "read_file".into(),
                arguments: serde_json::json!({}),
            },
            ToolCall {
                call_id: "tc_b".into(),
                tool_name: "write_file".into(),
                arguments: serde_json::json!({"path": "/tmp"}),
            },
        ];
        let msg = build_assistant_tool_message("thinking...", &calls);
        match &msg.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(&parts[0], ContentPart::Text { .. }));
                assert!(matches!(&parts[1], ContentPart::ToolUse { .. }));
                assert!(matches!(&parts[2], ContentPart::ToolUse { .. }));
            }
            _ => panic!("expected Parts content"),
        }
    }

    #[test]
    fn build_tool_msg_empty_text_not_included() {
        let msg = build_assistant_tool_message("", &[]);
        match &msg.content {
            MessageContent::Parts(parts) => {
                assert!(parts.is_empty(), "empty text and no tools should produce no parts");
            }
            _ => panic!("expected Parts content"),
        }
    }
}
