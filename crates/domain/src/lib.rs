//! Shared domain types for Voxgate.
//!
//! Everything the other crates agree on lives here: the configuration
//! surface, the shared error type, the conversation-turn model, and
//! structured trace events.

pub mod config;
pub mod error;
pub mod trace;
pub mod turn;

pub use config::Config;
pub use error::{Error, Result};
pub use turn::{ConversationTurn, ToolDefinition, ToolUseBlock};
