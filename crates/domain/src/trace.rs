use serde::Serialize;

/// Structured trace events emitted across all Voxgate crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionStarted {
        session_id: String,
        is_new: bool,
    },
    TurnStarted {
        session_id: String,
        transcript_count: u64,
    },
    ProviderCall {
        provider: String,
        duration_ms: u64,
        text_chars: usize,
        tool_use_blocks: usize,
    },
    ToolCallBridged {
        session_id: String,
        call_id: String,
        tool_name: String,
    },
    ToolResultResolved {
        session_id: String,
        call_id: String,
        is_error: bool,
    },
    TurnCompleted {
        session_id: String,
        provider_calls: u32,
        trace: String,
    },
    TurnFailed {
        session_id: String,
        code: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "vx_event");
    }
}
