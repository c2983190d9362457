//! Pending tool-call correlation.
//!
//! When a turn emits `tool.call` envelopes for the model's tool-use
//! blocks, it registers one waiter per call here and suspends on the
//! receivers. The reducer resolves inbound `tool.result` envelopes by
//! completing the matching waiter — no session lock is needed on that
//! path, so results flow while the turn holds its permit.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// What a `tool.result` resolved to.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

struct Waiter {
    session_id: String,
    tx: oneshot::Sender<ToolOutcome>,
}

pub struct ToolBridge {
    waiters: Mutex<HashMap<String, Waiter>>,
}

impl Default for ToolBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolBridge {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Register a waiter for an outbound call id.
    pub fn register(&self, session_id: &str, call_id: &str) -> oneshot::Receiver<ToolOutcome> {
        let (tx, rx) = oneshot::channel();
        let prev = self.waiters.lock().insert(
            call_id.to_owned(),
            Waiter {
                session_id: session_id.to_owned(),
                tx,
            },
        );
        debug_assert!(prev.is_none(), "call_id collision: {call_id}");
        rx
    }

    /// Complete a waiter. Returns `false` when no waiter is registered
    /// (UI-chain acks land here). A session mismatch against the waiter's
    /// record is logged and still processed; the connection binding should
    /// have made it impossible.
    pub fn complete(&self, session_id: &str, call_id: &str, outcome: ToolOutcome) -> bool {
        let waiter = match self.waiters.lock().remove(call_id) {
            Some(w) => w,
            None => return false,
        };
        if waiter.session_id != session_id {
            tracing::warn!(
                call_id = %call_id,
                expected = %waiter.session_id,
                got = %session_id,
                "tool.result session differs from pending record"
            );
        }
        let _ = waiter.tx.send(outcome);
        true
    }

    /// Drop every waiter of a session (turn failure or teardown). The
    /// suspended turn observes closed receivers. Returns how many were
    /// dropped.
    pub fn drop_session(&self, session_id: &str) -> usize {
        let mut waiters = self.waiters.lock();
        let before = waiters.len();
        waiters.retain(|_, w| w.session_id != session_id);
        before - waiters.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiters.lock().len()
    }
}
