//! Context-window compaction: collapses old conversation history into a
//! single system-role summary message so the context window stays
//! healthy across a long session.
//!
//! Uses marker-based boundary detection and a split-then-summarize flow,
//! operating over the canonical `sa_domain::tool::Message` history the
//! `ChatHistoryStore` holds (transcript persistence internals are an
//! external concern here).

use sa_domain::config::{CompactionConfig, EconomyConfig};
use sa_domain::tool::{Message, MessageContent, Role};
use sa_providers::traits::ChatRequest;
use sa_providers::LlmProvider;

const COMPACTION_MARKER: &str = "\u{0}compaction-summary\u{0}";

/// Rough chars-per-token ratio for the economy-mode token budget check.
/// Not a tokenizer — just enough to decide "are we probably getting close"
/// without pulling in a model-specific BPE dependency.
const CHARS_PER_TOKEN_ESTIMATE: usize = 4;

/// Find the index of the last compaction marker, or 0 if none exists.
/// The marker message itself is included (it becomes the new leading
/// system message for everything after it).
pub fn compaction_boundary(messages: &[Message]) -> usize {
    for i in (0..messages.len()).rev() {
        if is_compaction_marker(&messages[i]) {
            return i;
        }
    }
    0
}

/// Count user turns since the last compaction marker.
pub fn active_turn_count(messages: &[Message]) -> usize {
    let start = compaction_boundary(messages);
    messages[start..]
        .iter()
        .filter(|m| m.role == Role::User)
        .count()
}

/// Estimate the history's token footprint as total content length divided
/// by [`CHARS_PER_TOKEN_ESTIMATE`].
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let total_chars: usize = messages.iter().map(|m| m.content.extract_all_text().len()).sum();
    total_chars / CHARS_PER_TOKEN_ESTIMATE
}

/// Trigger compaction on whichever fires first: the turn-count threshold,
/// or — when economy mode is enabled and configured with a token budget —
/// the estimated context size crossing `context_max_tokens *
/// context_compaction_threshold`.
pub fn should_compact(messages: &[Message], config: &CompactionConfig, economy: &EconomyConfig) -> bool {
    if !config.auto {
        return false;
    }
    if active_turn_count(messages) > config.max_turns {
        return true;
    }
    if economy.enabled {
        if let (Some(max_tokens), Some(threshold)) = (economy.context_max_tokens, economy.context_compaction_threshold) {
            let trigger = (max_tokens as f64 * threshold) as usize;
            if estimate_tokens(messages) >= trigger {
                return true;
            }
        }
    }
    false
}

/// Split active messages into (messages_to_compact, messages_to_keep),
/// keeping the last `keep_last_turns` user turns (plus their trailing
/// assistant/tool messages) intact.
pub fn split_for_compaction(
    messages: &[Message],
    keep_last_turns: usize,
) -> (&[Message], &[Message]) {
    let boundary = compaction_boundary(messages);
    let active_start = if !messages.is_empty() && is_compaction_marker(&messages[boundary]) {
        boundary + 1
    } else {
        boundary
    };
    let active = &messages[active_start..];

    let mut user_count = 0;
    let mut keep_from = active.len();
    for (i, message) in active.iter().enumerate().rev() {
        if message.role == Role::User {
            user_count += 1;
            if user_count >= keep_last_turns {
                keep_from = i;
                break;
            }
        }
    }
    if user_count < keep_last_turns {
        keep_from = 0;
    }

    (&active[..keep_from], &active[keep_from..])
}

/// Summarize `messages_to_compact` via the LLM (non-streaming).
pub async fn generate_summary(
    provider: &dyn LlmProvider,
    messages_to_compact: &[Message],
) -> sa_domain::error::Result<String> {
    let conversation = build_conversation_text(messages_to_compact);

    let prompt = format!(
        "You are a conversation summarizer. Summarize the following conversation \
         history into a concise summary that preserves:\n\
         1. The current goal or plan being worked on\n\
         2. Key decisions made\n\
         3. Open questions or threads\n\
         4. Important facts learned about the user or context\n\
         5. Tool state (running processes, pending actions)\n\n\
         Be concise but preserve all actionable context. Write in present tense.\n\
         Omit greetings and pleasantries. Focus on substance.\n\n\
         CONVERSATION:\n{conversation}"
    );

    let req = ChatRequest {
        messages: vec![Message::user(&prompt)],
        tools: vec![],
        temperature: Some(0.1),
        max_tokens: Some(2000),
        json_mode: false,
        model: None,
    };

    let resp = provider.chat(req).await?;
    Ok(resp.content)
}

/// Build the system message that serves as the compaction marker. Its text
/// content is prefixed with a sentinel so `is_compaction_marker` can find
/// it again without a side-channel metadata field (`Message` carries none).
pub fn compaction_message(summary: &str, turns_compacted: usize) -> Message {
    Message {
        role: Role::System,
        content: MessageContent::Text(format!(
            "{COMPACTION_MARKER}[{turns_compacted} turns compacted]\n{summary}"
        )),
    }
}

/// Run the full compaction flow: split -> summarize -> persist the marker
/// as the new head of history. Returns the generated summary text.
pub async fn run_compaction(
    provider: &dyn LlmProvider,
    history: &dyn crate::runtime::history::ChatHistoryStore,
    session_id: &str,
    messages: &[Message],
    config: &CompactionConfig,
) -> sa_domain::error::Result<String> {
    let (to_compact, to_keep) = split_for_compaction(messages, config.keep_last_turns);

    if to_compact.is_empty() {
        return Ok(String::new());
    }

    let turns_compacted = to_compact.iter().filter(|m| m.role == Role::User).count();
    let summary = generate_summary(provider, to_compact).await?;

    let mut rewritten = Vec::with_capacity(1 + to_keep.len());
    rewritten.push(compaction_message(&summary, turns_compacted));
    rewritten.extend_from_slice(to_keep);
    history.replace(session_id, rewritten).await?;

    tracing::info!(
        session_id,
        turns_compacted,
        summary_len = summary.len(),
        "conversation history compacted"
    );

    Ok(summary)
}

/// Resolve an LLM provider suitable for compaction (summarizer > executor >
/// any).
pub fn resolve_compaction_provider(
    state: &crate::state::AppState,
) -> Option<std::sync::Arc<dyn LlmProvider>> {
    crate::runtime::resolve_summarizer(state)
}

fn is_compaction_marker(message: &Message) -> bool {
    message.role == Role::System
        && message
            .content
            .text()
            .is_some_and(|t| t.starts_with(COMPACTION_MARKER))
}

fn build_conversation_text(messages: &[Message]) -> String {
    let mut buf = String::new();
    for message in messages {
        let role_label = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
            Role::System => "System",
        };
        let content = message.content.extract_all_text();
        buf.push_str(role_label);
        buf.push_str(": ");
        if content.len() > 2000 {
            buf.push_str(&content[..1000]);
            buf.push_str(" [...] ");
            buf.push_str(&content[content.len() - 500..]);
        } else {
            buf.push_str(&content);
        }
        buf.push('\n');
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: Role, content: &str) -> Message {
        Message {
            role,
            content: MessageContent::Text(content.to_string()),
        }
    }

    #[test]
    fn no_compaction_marker() {
        let messages = vec![msg(Role::User, "hello"), msg(Role::Assistant, "hi")];
        assert_eq!(compaction_boundary(&messages), 0);
        assert_eq!(active_turn_count(&messages), 1);
    }

    #[test]
    fn compaction_boundary_after_marker() {
        let messages = vec![
            msg(Role::User, "old"),
            msg(Role::Assistant, "old reply"),
            compaction_message("summary of old conversation", 5),
            msg(Role::User, "new"),
            msg(Role::Assistant, "new reply"),
        ];
        assert_eq!(compaction_boundary(&messages), 2);
        assert_eq!(active_turn_count(&messages), 1);
    }

    #[test]
    fn should_compact_respects_threshold() {
        let config = CompactionConfig {
            auto: true,
            max_turns: 3,
            keep_last_turns: 1,
        };
        let messages: Vec<_> = (0..4)
            .flat_map(|i| {
                vec![
                    msg(Role::User, &format!("msg {i}")),
                    msg(Role::Assistant, &format!("reply {i}")),
                ]
            })
            .collect();
        assert!(should_compact(&messages, &config, &EconomyConfig::default()));
    }

    #[test]
    fn should_compact_false_when_auto_disabled() {
        let config = CompactionConfig {
            auto: false,
            max_turns: 0,
            keep_last_turns: 1,
        };
        let messages = vec![msg(Role::User, "hi")];
        assert!(!should_compact(&messages, &config, &EconomyConfig::default()));
    }

    #[test]
    fn should_compact_triggers_on_economy_token_threshold() {
        let config = CompactionConfig {
            auto: true,
            max_turns: 1000,
            keep_last_turns: 1,
        };
        let economy = EconomyConfig {
            enabled: true,
            context_max_tokens: Some(100),
            context_compaction_threshold: Some(0.5),
            ..Default::default()
        };
        let messages = vec![msg(Role::User, &"word ".repeat(100))];
        assert!(should_compact(&messages, &config, &economy));
    }

    #[test]
    fn should_compact_ignores_economy_threshold_when_disabled() {
        let config = CompactionConfig {
            auto: true,
            max_turns: 1000,
            keep_last_turns: 1,
        };
        let economy = EconomyConfig {
            enabled: false,
            context_max_tokens: Some(100),
            context_compaction_threshold: Some(0.5),
            ..Default::default()
        };
        let messages = vec![msg(Role::User, &"word ".repeat(100))];
        assert!(!should_compact(&messages, &config, &economy));
    }

    #[test]
    fn split_keeps_last_turns() {
        let messages: Vec<_> = (0..5)
            .flat_map(|i| {
                vec![
                    msg(Role::User, &format!("msg {i}")),
                    msg(Role::Assistant, &format!("reply {i}")),
                ]
            })
            .collect();

        let (to_compact, to_keep) = split_for_compaction(&messages, 2);
        let compact_users: Vec<_> = to_compact
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.extract_all_text())
            .collect();
        assert_eq!(compact_users, vec!["msg 0", "msg 1", "msg 2"]);

        let keep_users: Vec<_> = to_keep
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.extract_all_text())
            .collect();
        assert_eq!(keep_users, vec!["msg 3", "msg 4"]);
    }

    #[test]
    fn split_keeps_everything_when_fewer_turns_than_requested() {
        let messages = vec![msg(Role::User, "only turn"), msg(Role::Assistant, "reply")];
        let (to_compact, to_keep) = split_for_compaction(&messages, 5);
        assert!(to_compact.is_empty());
        assert_eq!(to_keep.len(), 2);
    }
}
