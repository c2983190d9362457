use serde::{Deserialize, Serialize};

/// A structured tool-use request emitted by the model.
///
/// `id` is the provider's own tool_use id. It is never sent to the client;
/// the conductor correlates it with a client-facing call id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Tool definition advertised to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// One entry in a session's conversation history.
///
/// History preserves insertion order. Every `ToolResult` answers a
/// `ToolUseBlock` that appeared earlier in the same session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationTurn {
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    AssistantToolUse {
        blocks: Vec<ToolUseBlock>,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: text.into(),
        }
    }

    pub fn tool_use(blocks: Vec<ToolUseBlock>) -> Self {
        Self::AssistantToolUse { blocks }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }

    /// The conversational role this turn plays.
    pub fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } | Self::AssistantToolUse { .. } => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }
}
