use std::collections::HashMap;

use parking_lot::Mutex;

/// Live connection counts per session.
///
/// A session may be reached over several transports at once (e.g. during a
/// reconnect overlap); an in-flight turn is only cancelled when the last
/// connection goes away.
pub struct ConnectionTracker {
    counts: Mutex<HashMap<String, usize>>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn connect(&self, session_id: &str) {
        *self.counts.lock().entry(session_id.to_owned()).or_insert(0) += 1;
    }

    /// Returns the number of connections still bound to the session.
    pub fn disconnect(&self, session_id: &str) -> usize {
        let mut counts = self.counts.lock();
        match counts.get_mut(session_id) {
            Some(n) if *n > 1 => {
                *n -= 1;
                *n
            }
            Some(_) => {
                counts.remove(session_id);
                0
            }
            None => 0,
        }
    }

    pub fn live_count(&self, session_id: &str) -> usize {
        self.counts.lock().get(session_id).copied().unwrap_or(0)
    }
}
