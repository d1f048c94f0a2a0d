use serde::Serialize;

/// Structured trace events emitted as a side-channel alongside normal
/// `tracing` spans, for consumers that want to watch specific milestones
/// (context assembly, provider routing) without parsing log lines.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    /// Emitted once per turn after the Context Preparer assembles the
    /// message list handed to the provider.
    ContextBuilt {
        total_injected_chars: usize,
        messages_included: usize,
        messages_summarized: usize,
        summary_chars: usize,
    },
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sa_event");
    }
}
