//! Event Stream Encoder: frames the Chat Loop's internal events into
//! the wire protocol the client consumes over SSE.
//!
//! Sixteen event kinds, one JSON object per frame, a terminal `[DONE]`
//! sentinel, and optional heartbeat comment lines while the run is idle
//! (e.g. waiting on an approval). Grounded on `sa_domain::stream::StreamEvent`'s
//! tagged-enum shape and the provider adapters' SSE framing
//! (`crates/providers/src/sse.rs`), but this is the outbound encoder for our
//! own run-level events rather than the inbound per-chunk provider parser.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use serde_json::Value;

/// One frame of the run's event stream. `#[serde(tag = "type")]` matches the
/// wire shape every event needs: a required `type` plus kind-specific
/// payload fields flattened alongside it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum RunEvent {
    RunStart {
        run_id: String,
    },
    SessionInfo {
        session_id: String,
    },
    Progress {
        iteration: u32,
        max_iterations: u32,
    },
    Token {
        text: String,
    },
    Thinking {
        text: String,
        streaming: bool,
    },
    ToolCall {
        name: String,
        args: Value,
        iteration: u32,
        max_iterations: u32,
    },
    ToolResult {
        name: String,
        result: Value,
    },
    ApprovalPending {
        id: String,
        tool: String,
        command: String,
    },
    Warning {
        code: String,
        message: String,
    },
    Usage {
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    },
    Compaction {
        messages_before: usize,
        messages_after: usize,
    },
    Alignment {
        score: f64,
        threshold: f64,
    },
    Fallback {
        failed_model: String,
        error: String,
    },
    DirectiveApplied {
        directive: String,
        value: Option<String>,
    },
    Aborted {
        reason: String,
    },
    Error {
        message: String,
    },
    Done {
        content: String,
        iterations: u32,
    },
}

/// `data: <json>\n\n` frame for one event.
pub fn encode(event: &RunEvent) -> String {
    let body = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("data: {body}\n\n")
}

/// The terminal sentinel that closes the stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// An empty SSE comment line, sent while the run is otherwise idle so
/// intermediate proxies don't time out the connection.
pub const HEARTBEAT_FRAME: &str = ": heartbeat\n\n";

/// Enforces the "silent after aborted" invariant: once `aborted` has
/// been emitted, every subsequent `encode` call through this gate is
/// suppressed rather than written to the stream.
#[derive(Default)]
pub struct EventGate {
    aborted: AtomicBool,
}

impl EventGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `event`, returning `None` if the stream has already emitted
    /// `aborted`. Marks the gate closed when `event` itself is `Aborted`.
    pub fn emit(&self, event: &RunEvent) -> Option<String> {
        if self.aborted.load(Ordering::Acquire) {
            return None;
        }
        if matches!(event, RunEvent::Aborted { .. }) {
            self.aborted.store(true, Ordering::Release);
        }
        Some(encode(event))
    }

    pub fn is_closed(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_as_data_frame_with_type_tag() {
        let frame = encode(&RunEvent::RunStart { run_id: "run-1".into() });
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains("\"type\":\"run_start\""));
        assert!(frame.contains("\"run_id\":\"run-1\""));
    }

    #[test]
    fn done_frame_is_literal_sentinel() {
        assert_eq!(DONE_FRAME, "data: [DONE]\n\n");
    }

    #[test]
    fn gate_emits_freely_before_aborted() {
        let gate = EventGate::new();
        assert!(gate.emit(&RunEvent::Token { text: "hi".into() }).is_some());
        assert!(!gate.is_closed());
    }

    #[test]
    fn gate_suppresses_everything_after_aborted() {
        let gate = EventGate::new();
        assert!(gate
            .emit(&RunEvent::Aborted { reason: "cancelled".into() })
            .is_some());
        assert!(gate.is_closed());
        assert!(gate.emit(&RunEvent::Token { text: "late".into() }).is_none());
        assert!(gate.emit(&RunEvent::Done { content: "x".into(), iterations: 1 }).is_none());
    }

    #[test]
    fn tool_call_then_tool_result_roundtrip_shapes() {
        let call = RunEvent::ToolCall {
            name: "read_file".into(),
            args: serde_json::json!({"path": "/x"}),
            iteration: 1,
            max_iterations: 10,
        };
        let result = RunEvent::ToolResult {
            name: "read_file".into(),
            result: serde_json::json!({"content": "abc"}),
        };
        assert!(encode(&call).contains("\"name\":\"read_file\""));
        assert!(encode(&result).contains("\"content\":\"abc\""));
    }

    #[test]
    fn warning_event_carries_code_and_message() {
        let event = RunEvent::Warning {
            code: "undo_guarantee_blocked".into(),
            message: "exec denied".into(),
        };
        let frame = encode(&event);
        assert!(frame.contains("\"code\":\"undo_guarantee_blocked\""));
    }
}
