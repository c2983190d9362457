use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vx_domain::ConversationTurn;

use crate::seen::SeenIds;

/// Bound on the diagnostic trace deque.
pub const TRACE_CAP: usize = 24;

/// Bound on the inbound dedup window.
pub const SEEN_IDS_CAP: usize = 256;

/// An outbound `tool.call` that has not yet received its `tool.result`.
///
/// Serializable so a durable [`crate::backend::SessionBackend`] can carry
/// records across a process restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub emitted_at: DateTime<Utc>,
    /// The LLM's `tool_use` block id, when the call originated from the
    /// model rather than the conductor's own UI chain. This is what gets
    /// written back into history; the client only ever sees `call_id`.
    pub provider_tool_use_id: Option<String>,
}

/// All conductor-owned state for one session.
///
/// Mutation is serialized by the session's turn gate plus the store's
/// per-entry mutex; this type itself is single-writer.
#[derive(Debug)]
pub struct SessionState {
    pub session_id: String,
    history: VecDeque<ConversationTurn>,
    /// `2 × max_turns`: room for tool-use expansions.
    max_history: usize,
    pending_tool_calls: HashMap<String, PendingToolCall>,
    recent_trace: VecDeque<String>,
    pub transcript_count: u64,
    pub seen_ids: SeenIds,
    /// Ancillary per-session credential recorded from `session.start`.
    pub aux_credential: Option<String>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, max_turns: usize) -> Self {
        Self {
            session_id: session_id.into(),
            history: VecDeque::new(),
            max_history: max_turns.saturating_mul(2).max(1),
            pending_tool_calls: HashMap::new(),
            recent_trace: VecDeque::with_capacity(TRACE_CAP),
            transcript_count: 0,
            seen_ids: SeenIds::new(SEEN_IDS_CAP),
            aux_credential: None,
        }
    }

    // ── History ────────────────────────────────────────────────────

    /// Append a turn, dropping the oldest entries past the bound.
    pub fn push_turn(&mut self, turn: ConversationTurn) {
        self.history.push_back(turn);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Clone the ordered history for a provider call.
    pub fn history_snapshot(&self) -> Vec<ConversationTurn> {
        self.history.iter().cloned().collect()
    }

    /// Replace the whole history, re-applying the bound.
    pub fn replace_history(&mut self, turns: Vec<ConversationTurn>) {
        self.history.clear();
        for turn in turns {
            self.push_turn(turn);
        }
    }

    // ── Pending tool calls ─────────────────────────────────────────

    pub fn insert_pending(&mut self, call: PendingToolCall) {
        self.pending_tool_calls.insert(call.call_id.clone(), call);
    }

    pub fn remove_pending(&mut self, call_id: &str) -> Option<PendingToolCall> {
        self.pending_tool_calls.remove(call_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending_tool_calls.len()
    }

    pub fn pending_calls(&self) -> impl Iterator<Item = &PendingToolCall> {
        self.pending_tool_calls.values()
    }

    /// Drop every pending entry (turn failure or session teardown).
    pub fn clear_pending(&mut self) -> usize {
        let n = self.pending_tool_calls.len();
        self.pending_tool_calls.clear();
        n
    }

    /// Drop pending entries older than `ttl_secs`.
    pub fn expire_pending(&mut self, now: DateTime<Utc>, ttl_secs: u64) -> usize {
        let before = self.pending_tool_calls.len();
        self.pending_tool_calls
            .retain(|_, call| (now - call.emitted_at).num_seconds() < ttl_secs as i64);
        before - self.pending_tool_calls.len()
    }

    // ── Trace ──────────────────────────────────────────────────────

    pub fn record_trace(&mut self, marker: impl Into<String>) {
        self.recent_trace.push_back(marker.into());
        while self.recent_trace.len() > TRACE_CAP {
            self.recent_trace.pop_front();
        }
    }

    pub fn reset_trace(&mut self) {
        self.recent_trace.clear();
    }

    pub fn trace_summary(&self) -> String {
        self.recent_trace
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" > ")
    }
}
