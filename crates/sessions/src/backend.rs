//! Pluggable session persistence.
//!
//! The conductor itself only talks to [`SessionStore`]; this trait names
//! the operations a durable backing store must provide so pending
//! tool-call records can survive a process restart. The in-process store
//! implements it directly and is the reference (and default) backend.

use serde::{Deserialize, Serialize};

use vx_domain::ConversationTurn;

use crate::state::PendingToolCall;
use crate::store::SessionStore;

/// The durable slice of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub history: Vec<ConversationTurn>,
    pub transcript_count: u64,
}

pub trait SessionBackend: Send + Sync {
    fn get_session(&self, session_id: &str) -> Option<SessionSnapshot>;

    /// Upsert the durable slice of a session.
    fn save_session(&self, snapshot: SessionSnapshot);

    fn put_pending_tool_call(&self, session_id: &str, call: PendingToolCall);

    fn get_pending_tool_calls(&self, session_id: &str) -> Vec<PendingToolCall>;

    /// Returns `true` when an entry was removed.
    fn delete_pending_tool_call(&self, session_id: &str, call_id: &str) -> bool;
}

impl SessionBackend for SessionStore {
    fn get_session(&self, session_id: &str) -> Option<SessionSnapshot> {
        let entry = self.get(session_id)?;
        let state = entry.lock();
        Some(SessionSnapshot {
            session_id: state.session_id.clone(),
            history: state.history_snapshot(),
            transcript_count: state.transcript_count,
        })
    }

    fn save_session(&self, snapshot: SessionSnapshot) {
        let (entry, _) = self.get_or_create(&snapshot.session_id);
        let mut state = entry.lock();
        // replace_history re-applies the history bound on the way in.
        state.replace_history(snapshot.history);
        state.transcript_count = snapshot.transcript_count;
    }

    fn put_pending_tool_call(&self, session_id: &str, call: PendingToolCall) {
        let (entry, _) = self.get_or_create(session_id);
        entry.lock().insert_pending(call);
    }

    fn get_pending_tool_calls(&self, session_id: &str) -> Vec<PendingToolCall> {
        match self.get(session_id) {
            Some(entry) => entry.lock().pending_calls().cloned().collect(),
            None => Vec::new(),
        }
    }

    fn delete_pending_tool_call(&self, session_id: &str, call_id: &str) -> bool {
        match self.get(session_id) {
            Some(entry) => entry.lock().remove_pending(call_id).is_some(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn backend() -> SessionStore {
        SessionStore::new(20, 30)
    }

    #[test]
    fn snapshot_round_trip() {
        let store = backend();
        store.save_session(SessionSnapshot {
            session_id: "s1".into(),
            history: vec![
                ConversationTurn::user("hi"),
                ConversationTurn::assistant("hello"),
            ],
            transcript_count: 1,
        });

        let snap = store.get_session("s1").unwrap();
        assert_eq!(snap.history.len(), 2);
        assert_eq!(snap.transcript_count, 1);
        assert!(store.get_session("missing").is_none());
    }

    #[test]
    fn pending_records_survive_by_session() {
        let store = backend();
        store.put_pending_tool_call(
            "s1",
            PendingToolCall {
                call_id: "c1".into(),
                tool_name: "agent.spawn".into(),
                emitted_at: Utc::now(),
                provider_tool_use_id: Some("u1".into()),
            },
        );

        let pending = store.get_pending_tool_calls("s1");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].provider_tool_use_id.as_deref(), Some("u1"));

        assert!(store.delete_pending_tool_call("s1", "c1"));
        assert!(!store.delete_pending_tool_call("s1", "c1"));
        assert!(store.get_pending_tool_calls("s1").is_empty());
    }
}
