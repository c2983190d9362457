//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API including tool use and the
//! Anthropic-specific message structure where system text goes in a
//! separate top-level `system` field and tool results travel as user
//! messages with `tool_result` content blocks.
//!
//! The API rejects dots in tool names, so names are rewritten `a.b` →
//! `a_b` on the way out and restored from the request's mapping on the
//! way back. Callers only ever see original names.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use vx_domain::config::Config;
use vx_domain::error::{Error, Result};
use vx_domain::turn::{ConversationTurn, ToolDefinition, ToolUseBlock};

use crate::chunk::{chunk_text, stream_from_chunks};
use crate::traits::{GenerateRequest, ModelProvider, ModelResponse};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub const PROVIDER_NAME: &str = "anthropic";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    system_prompt: Option<String>,
    min_chunk: usize,
    max_chunk: usize,
    partial_delay_ms: u64,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let api_key = std::env::var(&cfg.llm.api_key_env)
            .map_err(|_| Error::Config(format!("{} is not set", cfg.llm.api_key_env)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.llm.timeout_secs))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            base_url: cfg.llm.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.llm.model.clone(),
            max_tokens: cfg.llm.max_tokens,
            system_prompt: cfg.llm.system_prompt.clone(),
            min_chunk: cfg.speech.min_chunk,
            max_chunk: cfg.speech.max_chunk,
            partial_delay_ms: cfg.speech.partial_delay_ms,
            client,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool-name mapping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Rewrite a tool name to the character set the API accepts.
fn sanitize_tool_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Translate a wire name back to the original, falling through for names
/// that never needed rewriting.
fn restore_tool_name(name: &str, name_map: &HashMap<String, String>) -> String {
    name_map
        .get(name)
        .cloned()
        .unwrap_or_else(|| name.to_owned())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct MessagesBody {
    body: Value,
    /// sanitized → original, for restoring inbound tool-use names.
    name_map: HashMap<String, String>,
}

fn build_messages_body(
    model: &str,
    max_tokens: u32,
    system_prompt: Option<&str>,
    req: &GenerateRequest,
) -> MessagesBody {
    let mut name_map: HashMap<String, String> = HashMap::new();
    for tool in &req.tools {
        name_map.insert(sanitize_tool_name(&tool.name), tool.name.clone());
    }

    let mut api_messages: Vec<Value> = Vec::new();
    for turn in &req.history {
        api_messages.push(match turn {
            ConversationTurn::User { content } => serde_json::json!({
                "role": "user",
                "content": content,
            }),
            ConversationTurn::Assistant { content } => serde_json::json!({
                "role": "assistant",
                "content": [{"type": "text", "text": content}],
            }),
            ConversationTurn::AssistantToolUse { blocks } => {
                let content: Vec<Value> = blocks
                    .iter()
                    .map(|b| {
                        let wire_name = sanitize_tool_name(&b.name);
                        name_map.insert(wire_name.clone(), b.name.clone());
                        serde_json::json!({
                            "type": "tool_use",
                            "id": b.id,
                            "name": wire_name,
                            "input": b.input,
                        })
                    })
                    .collect();
                serde_json::json!({
                    "role": "assistant",
                    "content": content,
                })
            }
            ConversationTurn::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => serde_json::json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                    "is_error": is_error,
                }],
            }),
        });
    }

    let mut body = serde_json::json!({
        "model": model,
        "messages": api_messages,
        "max_tokens": max_tokens,
    });

    if let Some(system) = system_prompt {
        body["system"] = Value::String(system.to_owned());
    }

    if !req.tools.is_empty() {
        let tools: Vec<Value> = req.tools.iter().map(tool_to_anthropic).collect();
        body["tools"] = Value::Array(tools);
    }

    MessagesBody { body, name_map }
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": sanitize_tool_name(&tool.name),
        "description": tool.description,
        "input_schema": tool.input_schema,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_response(body: &Value, name_map: &HashMap<String, String>) -> (String, Vec<ToolUseBlock>) {
    let empty = Vec::new();
    let content = body
        .get("content")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<ToolUseBlock> = Vec::new();

    for block in content {
        match block.get("type").and_then(Value::as_str).unwrap_or("") {
            "text" => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text_parts.push(t);
                }
            }
            "tool_use" => {
                let id = block
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                let wire_name = block.get("name").and_then(Value::as_str).unwrap_or("");
                let input = block
                    .get("input")
                    .cloned()
                    .unwrap_or(Value::Object(Default::default()));
                tool_calls.push(ToolUseBlock {
                    id,
                    name: restore_tool_name(wire_name, name_map),
                    input,
                });
            }
            _ => {}
        }
    }

    (text_parts.concat(), tool_calls)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ModelProvider for AnthropicProvider {
    async fn generate_response(&self, req: GenerateRequest) -> Result<ModelResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let MessagesBody { body, name_map } = build_messages_body(
            &self.model,
            self.max_tokens,
            self.system_prompt.as_deref(),
            &req,
        );

        tracing::debug!(url = %url, model = %self.model, "anthropic messages request");

        // A session-scoped credential recorded at session.start overrides
        // the process-wide key.
        let api_key = req.aux_credential.as_deref().unwrap_or(&self.api_key);

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: PROVIDER_NAME.into(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let value: Value = serde_json::from_str(&resp_text)?;
        let (full_text, tool_calls) = parse_response(&value, &name_map);

        tracing::debug!(
            text_chars = full_text.len(),
            tool_use_blocks = tool_calls.len(),
            "anthropic messages response"
        );

        let chunks = stream_from_chunks(
            chunk_text(&full_text, self.min_chunk, self.max_chunk),
            self.partial_delay_ms,
        );

        Ok(ModelResponse {
            full_text,
            chunks,
            tool_calls,
        })
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(history: Vec<ConversationTurn>, tools: Vec<ToolDefinition>) -> GenerateRequest {
        GenerateRequest {
            history,
            tools,
            aux_credential: None,
        }
    }

    #[test]
    fn sanitize_rewrites_dots_to_underscores() {
        assert_eq!(sanitize_tool_name("convo.setState"), "convo_setState");
        assert_eq!(sanitize_tool_name("agent.spawn"), "agent_spawn");
        assert_eq!(sanitize_tool_name("plain-name_1"), "plain-name_1");
    }

    #[test]
    fn restore_round_trips_through_the_map() {
        let mut map = HashMap::new();
        map.insert("agent_spawn".to_string(), "agent.spawn".to_string());
        assert_eq!(restore_tool_name("agent_spawn", &map), "agent.spawn");
        assert_eq!(restore_tool_name("unmapped", &map), "unmapped");
    }

    #[test]
    fn body_maps_history_to_anthropic_roles() {
        let history = vec![
            ConversationTurn::user("hello"),
            ConversationTurn::tool_use(vec![ToolUseBlock {
                id: "u1".into(),
                name: "agent.spawn".into(),
                input: serde_json::json!({"prompt": "fix bug"}),
            }]),
            ConversationTurn::tool_result("u1", r#"{"id":"A"}"#, false),
        ];
        let req = request_with(history, vec![]);
        let MessagesBody { body, name_map } =
            build_messages_body("claude-sonnet-4-20250514", 1024, Some("be brief"), &req);

        assert_eq!(body["system"], "be brief");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        // Dotted names never cross the wire.
        assert_eq!(messages[1]["content"][0]["name"], "agent_spawn");
        // Tool results ride as user messages with tool_result blocks.
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "u1");

        assert_eq!(name_map.get("agent_spawn").unwrap(), "agent.spawn");
    }

    #[test]
    fn body_advertises_sanitized_tool_catalog() {
        let tools = vec![ToolDefinition {
            name: "notes.search".into(),
            description: "Search notes".into(),
            input_schema: serde_json::json!({"type": "object"}),
        }];
        let req = request_with(vec![ConversationTurn::user("hi")], tools);
        let MessagesBody { body, .. } = build_messages_body("m", 512, None, &req);

        assert_eq!(body["tools"][0]["name"], "notes_search");
        assert!(body.get("system").is_none());
    }

    #[test]
    fn parse_extracts_text_and_restores_tool_names() {
        let mut map = HashMap::new();
        map.insert("notes_search".to_string(), "notes.search".to_string());
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "Looking"},
                {"type": "text", "text": " that up."},
                {"type": "tool_use", "id": "u9", "name": "notes_search",
                 "input": {"query": "standup"}},
            ]
        });

        let (text, calls) = parse_response(&body, &map);
        assert_eq!(text, "Looking that up.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "u9");
        assert_eq!(calls[0].name, "notes.search");
        assert_eq!(calls[0].input["query"], "standup");
    }

    #[test]
    fn parse_tolerates_missing_content() {
        let (text, calls) = parse_response(&serde_json::json!({}), &HashMap::new());
        assert!(text.is_empty());
        assert!(calls.is_empty());
    }
}
