//! Envelope codec: parse, validate, and build wire events.
//!
//! Parsing never panics and never throws — every rejection is a value
//! carrying the wire-level error code. Envelopes built through the
//! constructors are always well-formed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::{codes, types};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The sole wire unit: a self-describing event with a session binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique event id, used for inbound deduplication.
    pub id: String,
    /// Dotted lowercase type tag (e.g. `user.audio.transcript.final`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    pub session_id: String,
    /// Unordered string-keyed payload. Always a JSON object.
    pub payload: Map<String, Value>,
}

/// Why an inbound frame was rejected by the codec.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("frame is {size} bytes, ceiling is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(serde_json::Error),
    #[error("envelope must be a JSON object")]
    NotAnObject,
    #[error("missing or empty field: id")]
    MissingId,
    #[error("missing or empty field: type")]
    MissingType,
    #[error("missing or empty field: timestamp")]
    MissingTimestamp,
    #[error("missing or empty field: sessionId")]
    MissingSessionId,
    #[error("payload must be a JSON object")]
    MissingPayload,
}

impl EnvelopeError {
    /// The wire-level error code reported back to the client.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => codes::EVENT_TOO_LARGE,
            Self::InvalidJson(_) => codes::INVALID_JSON,
            Self::NotAnObject => codes::INVALID_EVENT,
            Self::MissingId => codes::MISSING_ID,
            Self::MissingType => codes::MISSING_TYPE,
            Self::MissingTimestamp => codes::MISSING_TIMESTAMP,
            Self::MissingSessionId => codes::MISSING_SESSION_ID,
            Self::MissingPayload => codes::MISSING_PAYLOAD,
        }
    }
}

impl Envelope {
    /// Validate and decode one inbound frame.
    pub fn parse(raw: &[u8], max_bytes: usize) -> Result<Self, EnvelopeError> {
        if raw.len() > max_bytes {
            return Err(EnvelopeError::TooLarge {
                size: raw.len(),
                max: max_bytes,
            });
        }

        let value: Value = serde_json::from_slice(raw).map_err(EnvelopeError::InvalidJson)?;
        let obj = value.as_object().ok_or(EnvelopeError::NotAnObject)?;

        let id = required_str(obj, "id").ok_or(EnvelopeError::MissingId)?;
        let event_type = required_str(obj, "type").ok_or(EnvelopeError::MissingType)?;
        let timestamp = required_str(obj, "timestamp").ok_or(EnvelopeError::MissingTimestamp)?;
        let session_id = required_str(obj, "sessionId").ok_or(EnvelopeError::MissingSessionId)?;
        let payload = obj
            .get("payload")
            .and_then(Value::as_object)
            .ok_or(EnvelopeError::MissingPayload)?
            .clone();

        Ok(Self {
            id,
            event_type,
            timestamp,
            session_id,
            payload,
        })
    }

    /// Build a fresh, well-formed envelope with a generated id and
    /// current timestamp.
    pub fn new(event_type: &str, session_id: &str, payload: Map<String, Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.to_owned(),
            timestamp: Utc::now().to_rfc3339(),
            session_id: session_id.to_owned(),
            payload,
        }
    }

    /// Serialize to the UTF-8 JSON wire form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    // ── Payload accessors ──────────────────────────────────────────

    /// A required string payload value; empty counts as absent.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// A nullable string payload value; JSON null and absence both map
    /// to `None`.
    pub fn payload_opt_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    // ── Outbound builders ──────────────────────────────────────────

    pub fn session_started(session_id: &str) -> Self {
        let mut payload = Map::new();
        payload.insert("sessionId".into(), Value::String(session_id.to_owned()));
        Self::new(types::SESSION_STARTED, session_id, payload)
    }

    pub fn speech_partial(session_id: &str, text: &str) -> Self {
        let mut payload = Map::new();
        payload.insert("text".into(), Value::String(text.to_owned()));
        Self::new(types::SPEECH_PARTIAL, session_id, payload)
    }

    pub fn speech_final(session_id: &str, text: &str) -> Self {
        let mut payload = Map::new();
        payload.insert("text".into(), Value::String(text.to_owned()));
        Self::new(types::SPEECH_FINAL, session_id, payload)
    }

    /// A `tool.call` envelope. `arguments` is the JSON-encoded argument
    /// object, passed through as a string per the client protocol.
    pub fn tool_call(session_id: &str, call_id: &str, name: &str, arguments: String) -> Self {
        let mut payload = Map::new();
        payload.insert("callId".into(), Value::String(call_id.to_owned()));
        payload.insert("name".into(), Value::String(name.to_owned()));
        payload.insert("arguments".into(), Value::String(arguments));
        Self::new(types::TOOL_CALL, session_id, payload)
    }

    pub fn error(session_id: &str, code: &str, message: &str) -> Self {
        let mut payload = Map::new();
        payload.insert("code".into(), Value::String(code.to_owned()));
        payload.insert("message".into(), Value::String(message.to_owned()));
        Self::new(types::ERROR, session_id, payload)
    }
}

fn required_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
