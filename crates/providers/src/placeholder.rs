//! Offline placeholder provider, used when the live provider is disabled.

use vx_domain::error::Result;

use crate::chunk::stream_from_chunks;
use crate::traits::{GenerateRequest, ModelProvider, ModelResponse};

pub const PROVIDER_NAME: &str = "placeholder";

const NARRATIVE: &str = "I'm running without a language model right now, so I \
can't actually think about what you said. Everything else is wired up though: \
your transcript made it to the conductor and this reply is being streamed \
back to you.";

pub struct PlaceholderProvider {
    narrative: String,
    partial_delay_ms: u64,
}

impl PlaceholderProvider {
    pub fn new(partial_delay_ms: u64) -> Self {
        Self {
            narrative: NARRATIVE.to_owned(),
            partial_delay_ms,
        }
    }
}

#[async_trait::async_trait]
impl ModelProvider for PlaceholderProvider {
    async fn generate_response(&self, _req: GenerateRequest) -> Result<ModelResponse> {
        Ok(ModelResponse {
            full_text: self.narrative.clone(),
            chunks: stream_from_chunks(vec![self.narrative.clone()], self.partial_delay_ms),
            tool_calls: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn single_chunk_equals_full_text() {
        let provider = PlaceholderProvider::new(0);
        let resp = provider
            .generate_response(GenerateRequest {
                history: vec![vx_domain::ConversationTurn::user("hi")],
                tools: vec![],
                aux_credential: None,
            })
            .await
            .unwrap();

        let chunks: Vec<String> = resp.chunks.collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], resp.full_text);
        assert!(resp.tool_calls.is_empty());
    }
}
