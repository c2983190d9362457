use std::pin::Pin;

use vx_domain::error::Result;
use vx_domain::turn::{ConversationTurn, ToolDefinition, ToolUseBlock};

/// A finite, single-pass, lazy sequence of speech chunks.
///
/// Deliberately independent of any concurrency primitive: a channel, an
/// iterator, or a callback stream all satisfy it. The conductor drives
/// consumption; the concatenation of yielded chunks equals the response's
/// `full_text` up to per-chunk leading-whitespace trimming.
pub type ChunkStream = Pin<Box<dyn futures_core::Stream<Item = String> + Send + 'static>>;

/// One provider invocation's input.
pub struct GenerateRequest {
    /// The session history, oldest first.
    pub history: Vec<ConversationTurn>,
    /// Tools the model may request. May be empty.
    pub tools: Vec<ToolDefinition>,
    /// Per-session auxiliary credential recorded at `session.start`.
    pub aux_credential: Option<String>,
}

/// One model turn.
pub struct ModelResponse {
    /// The complete assistant text; empty when the model only requested
    /// tools.
    pub full_text: String,
    /// Lazy chunk stream over `full_text`. Consumable exactly once; always
    /// terminates; yields at least one chunk when `full_text` is non-empty.
    pub chunks: ChunkStream,
    /// Structured tool-use requests, in model order. Names are always the
    /// original dotted names; adapters undo any provider-side rewriting.
    pub tool_calls: Vec<ToolUseBlock>,
}

/// Adapter to an external LLM.
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate_response(&self, req: GenerateRequest) -> Result<ModelResponse>;

    /// Stable provider name (e.g. `"anthropic"`).
    fn name(&self) -> &str;
}
