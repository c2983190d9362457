//! Session management for Voxgate.
//!
//! Owns per-session conversation state (bounded history, pending tool-call
//! correlations, inbound dedup ids, diagnostic trace), the in-process
//! session store, the per-connection rate limiter, and the per-session
//! turn gate that serializes turn execution.

pub mod backend;
pub mod gate;
pub mod limiter;
pub mod seen;
pub mod state;
pub mod store;

pub use backend::{SessionBackend, SessionSnapshot};
pub use gate::TurnGate;
pub use limiter::RateLimiter;
pub use seen::SeenIds;
pub use state::{PendingToolCall, SessionState};
pub use store::SessionStore;
