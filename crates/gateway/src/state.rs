use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use vx_domain::config::Config;
use vx_providers::ModelProvider;
use vx_sessions::{SessionStore, TurnGate};

use crate::conductor::bridge::ToolBridge;
use crate::conductor::cancel::CancelMap;
use crate::connections::ConnectionTracker;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Per-session conversation state, keyed by session id.
    pub sessions: Arc<SessionStore>,
    /// Per-session turn serialization.
    pub turn_gate: Arc<TurnGate>,
    pub provider: Arc<dyn ModelProvider>,
    /// Pending tool-call waiters (call id → suspended turn).
    pub bridge: Arc<ToolBridge>,
    /// Per-session cancellation for connection drops.
    pub cancel_map: Arc<CancelMap>,
    /// Live connection counts per session.
    pub connections: Arc<ConnectionTracker>,
    /// Process-wide shutdown signal; every await on the turn path honors it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Arc<Config>, provider: Arc<dyn ModelProvider>) -> Self {
        let sessions = Arc::new(SessionStore::new(
            config.limits.max_turns,
            config.limits.rate_limit_per_min,
        ));
        Self {
            config,
            sessions,
            turn_gate: Arc::new(TurnGate::new()),
            provider,
            bridge: Arc::new(ToolBridge::new()),
            cancel_map: Arc::new(CancelMap::new()),
            connections: Arc::new(ConnectionTracker::new()),
            shutdown: CancellationToken::new(),
        }
    }
}
