//! The closed event-type catalog and protocol-wide constant names.

/// Inbound and outbound event type tags.
pub mod types {
    pub const SESSION_START: &str = "session.start";
    pub const SESSION_STARTED: &str = "session.started";
    pub const TRANSCRIPT_PARTIAL: &str = "user.audio.transcript.partial";
    pub const TRANSCRIPT_FINAL: &str = "user.audio.transcript.final";
    pub const SPEECH_PARTIAL: &str = "assistant.speech.partial";
    pub const SPEECH_FINAL: &str = "assistant.speech.final";
    pub const UI_PATCH: &str = "assistant.ui.patch";
    pub const AUDIO_INTERRUPTED: &str = "audio.output.interrupted";
    pub const TOOL_CALL: &str = "tool.call";
    pub const TOOL_RESULT: &str = "tool.result";
    pub const ERROR: &str = "error";
}

/// Error codes carried in `error` envelopes.
pub mod codes {
    pub const INVALID_JSON: &str = "invalid_json";
    pub const INVALID_EVENT: &str = "invalid_event";
    pub const EVENT_TOO_LARGE: &str = "event_too_large";
    pub const MISSING_ID: &str = "missing_id";
    pub const MISSING_TYPE: &str = "missing_type";
    pub const MISSING_TIMESTAMP: &str = "missing_timestamp";
    pub const MISSING_SESSION_ID: &str = "missing_session_id";
    pub const MISSING_PAYLOAD: &str = "missing_payload";
    pub const SESSION_MISMATCH: &str = "session_mismatch";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const INVALID_TRANSCRIPT: &str = "invalid_transcript";
    pub const NO_PENDING_TOOL_CALL: &str = "no_pending_tool_call";
    pub const INVALID_TOOL_CALL: &str = "invalid_tool_call";
    pub const MODEL_PROVIDER_FAILED: &str = "model_provider_failed";
    pub const CONDUCTOR_ERROR: &str = "conductor_error";
}

/// Client-side tool names the conductor emits on its own behalf.
pub mod tools {
    pub const CONVO_SET_STATE: &str = "convo.setState";
    pub const CONVO_APPEND_MESSAGE: &str = "convo.appendMessage";
    pub const TTS_SPEAK: &str = "tts.speak";
    pub const TTS_STOP: &str = "tts.stop";
}

/// Discriminated inbound event kind.
///
/// The catalog is closed: anything outside it classifies as `Unknown` and
/// is acknowledged but ignored by the conductor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SessionStart,
    TranscriptPartial,
    TranscriptFinal,
    ToolResult,
    AudioInterrupted,
    Unknown,
}

impl EventKind {
    pub fn classify(event_type: &str) -> Self {
        match event_type {
            types::SESSION_START => Self::SessionStart,
            types::TRANSCRIPT_PARTIAL => Self::TranscriptPartial,
            types::TRANSCRIPT_FINAL => Self::TranscriptFinal,
            types::TOOL_RESULT => Self::ToolResult,
            types::AUDIO_INTERRUPTED => Self::AudioInterrupted,
            _ => Self::Unknown,
        }
    }
}
