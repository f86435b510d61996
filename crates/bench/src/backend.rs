use async_trait::async_trait;

use milton_llm::{ChatMessage, InferenceClient};

#[derive(Debug, Clone)]
pub struct GenerationStats {
    pub content: String,
    pub time_to_first_token: std::time::Duration,
    pub total_duration: std::time::Duration,
    pub completion_tokens: u32,
}

/// Abstraction over a single-prompt completion call, so every tier can be
/// exercised in tests against a scripted backend instead of a live server.
#[async_trait]
pub trait GenerateClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> anyhow::Result<GenerationStats>;
}

#[async_trait]
impl GenerateClient for InferenceClient {
    async fn generate(&self, prompt: &str) -> anyhow::Result<GenerationStats> {
        let completion = self.chat(&[ChatMessage::user(prompt)]).await?;
        Ok(GenerationStats {
            content: completion.content,
            time_to_first_token: completion.time_to_first_token,
            total_duration: completion.total_duration,
            completion_tokens: completion.completion_tokens,
        })
    }
}
