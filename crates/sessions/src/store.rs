//! In-process session store.
//!
//! Sessions are created lazily on first reference and retained for the
//! process lifetime. Each entry is an `Arc<Mutex<SessionState>>`: the
//! store's read lock is held only long enough to clone the entry handle,
//! so sessions never contend with each other.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

use vx_domain::trace::TraceEvent;

use crate::limiter::RateLimiter;
use crate::state::SessionState;

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionState>>>>,
    max_turns: usize,
    rate_limit_per_min: u32,
}

impl SessionStore {
    pub fn new(max_turns: usize, rate_limit_per_min: u32) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns,
            rate_limit_per_min,
        }
    }

    /// Look up a session without creating it.
    pub fn get(&self, session_id: &str) -> Option<Arc<Mutex<SessionState>>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Resolve or lazily create a session. Returns `(entry, is_new)`.
    pub fn get_or_create(&self, session_id: &str) -> (Arc<Mutex<SessionState>>, bool) {
        // Fast path: session already exists.
        {
            let sessions = self.sessions.read();
            if let Some(entry) = sessions.get(session_id) {
                return (entry.clone(), false);
            }
        }

        let mut sessions = self.sessions.write();
        // Double-check under the write lock; another connection may have
        // raced us here.
        if let Some(entry) = sessions.get(session_id) {
            return (entry.clone(), false);
        }

        let entry = Arc::new(Mutex::new(SessionState::new(session_id, self.max_turns)));
        sessions.insert(session_id.to_owned(), entry.clone());

        TraceEvent::SessionStarted {
            session_id: session_id.to_owned(),
            is_new: true,
        }
        .emit();

        (entry, true)
    }

    /// A fresh per-connection limiter with the configured admission cap.
    pub fn create_rate_limiter(&self) -> RateLimiter {
        RateLimiter::per_minute(self.rate_limit_per_min)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vx_domain::ConversationTurn;

    #[test]
    fn get_or_create_is_lazy_and_idempotent() {
        let store = SessionStore::new(20, 30);
        assert!(store.get("s1").is_none());

        let (entry, is_new) = store.get_or_create("s1");
        assert!(is_new);
        entry.lock().push_turn(ConversationTurn::user("hello"));

        let (again, is_new) = store.get_or_create("s1");
        assert!(!is_new);
        assert_eq!(again.lock().history_len(), 1);
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn sessions_are_isolated() {
        let store = SessionStore::new(20, 30);
        let (s1, _) = store.get_or_create("s1");
        let (s2, _) = store.get_or_create("s2");
        s1.lock().push_turn(ConversationTurn::user("for s1"));
        assert_eq!(s2.lock().history_len(), 0);
    }

    #[test]
    fn limiter_uses_configured_cap() {
        let store = SessionStore::new(20, 2);
        let mut limiter = store.create_rate_limiter();
        let now = std::time::Instant::now();
        assert!(limiter.allow(now));
        assert!(limiter.allow(now));
        assert!(!limiter.allow(now));
    }
}
