//! Per-session turn serialization.
//!
//! Each session id maps to a `Semaphore(1)`. A turn holds the permit for
//! its full duration (including provider calls and tool bridging), so for
//! any session at most one turn-processing routine runs at any instant.
//! Independent sessions never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct TurnGate {
    permits: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for TurnGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnGate {
    pub fn new() -> Self {
        Self {
            permits: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for the session's turn permit. The permit releases on drop.
    pub async fn acquire(&self, session_id: &str) -> Result<OwnedSemaphorePermit, GateClosed> {
        let sem = {
            let mut permits = self.permits.lock();
            permits
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.acquire_owned().await.map_err(|_| GateClosed)
    }

    /// Number of sessions with a tracked permit (for monitoring).
    pub fn session_count(&self) -> usize {
        self.permits.lock().len()
    }

    /// Drop gate entries whose permit is not currently held.
    pub fn prune_idle(&self) {
        let mut permits = self.permits.lock();
        permits.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// The semaphore was closed; cannot happen in normal operation.
#[derive(Debug)]
pub struct GateClosed;

impl std::fmt::Display for GateClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "turn gate closed")
    }
}

impl std::error::Error for GateClosed {}
