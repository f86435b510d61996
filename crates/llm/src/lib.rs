//! Inference Client: a single OpenAI-compatible chat client
//! speaking to the local inference server's `/v1/chat/completions` endpoint.
//!
//! Same SSE `data: {json}` / `data: [DONE]` parsing and
//! `mpsc::Sender<String>` token-forwarding shape used for other streaming
//! chat providers, collapsed down to the one provider Milton talks to (no
//! fallback chain, no tool-calling: the inference server is treated as an
//! opaque collaborator).

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// Result of a completed streaming call, including the latency figures the
/// benchmark runner and gateway both need.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Time from request send to first streamed token — used by the
    /// benchmark runner's inference-tier metrics.
    pub time_to_first_token: Duration,
    pub total_duration: Duration,
}

#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl InferenceClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self { client, base_url: base_url.into(), model: model.into() }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Non-streaming convenience wrapper over `chat_stream` for callers that
    /// only need the final text (intent normalization, agent routing).
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatCompletion> {
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let handle = tokio::spawn(async move {
            let mut buf = String::new();
            while let Some(piece) = rx.recv().await {
                buf.push_str(&piece);
            }
            buf
        });
        let completion = self.chat_stream(messages, tx).await?;
        let _ = handle.await;
        Ok(completion)
    }

    /// Stream a chat completion, forwarding each token to `tx` as it
    /// arrives. Returns the accumulated completion once the stream ends.
    pub async fn chat_stream(&self, messages: &[ChatMessage], tx: mpsc::Sender<String>) -> Result<ChatCompletion> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        let started = Instant::now();
        let mut response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .json(&payload)
            .send()
            .await
            .context("sending chat completion request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("inference server returned {status}: {body}");
        }

        let mut content = String::new();
        let mut first_token_at: Option<Instant> = None;
        let mut finish_usage: Option<(u32, u32)> = None;

        while let Some(chunk) = response.chunk().await.context("reading stream chunk")? {
            let chunk_str = String::from_utf8_lossy(&chunk);
            for line in chunk_str.lines() {
                let line = line.trim();
                if line.is_empty() || line == "data: [DONE]" {
                    continue;
                }
                let Some(data) = line.strip_prefix("data: ") else { continue };
                let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else { continue };

                if let Some(piece) = event
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|choice| choice.get("delta"))
                    .and_then(|delta| delta.get("content"))
                    .and_then(|v| v.as_str())
                {
                    if !piece.is_empty() {
                        if first_token_at.is_none() {
                            first_token_at = Some(Instant::now());
                        }
                        content.push_str(piece);
                        let _ = tx.send(piece.to_string()).await;
                    }
                }

                if let Some(usage) = event.get("usage") {
                    let prompt = usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                    let completion = usage.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                    finish_usage = Some((prompt, completion));
                }
            }
        }

        let total_duration = started.elapsed();
        let time_to_first_token = first_token_at.map(|t| t - started).unwrap_or(total_duration);
        let (prompt_tokens, completion_tokens) = finish_usage.unwrap_or((0, estimate_tokens(&content)));

        Ok(ChatCompletion { content, prompt_tokens, completion_tokens, time_to_first_token, total_duration })
    }
}

/// Rough fallback token count (~4 chars/token) for servers that omit `usage`
/// on streamed responses.
fn estimate_tokens(text: &str) -> u32 {
    ((text.len() as f64) / 4.0).ceil() as u32
}

/// Pull a JSON object out of an LLM reply that may wrap it in a fenced
/// ```json block or surrounding prose. Used by the intent normalizer and
/// agent router to parse structured replies without requiring the model to
/// emit bare JSON.
pub fn extract_json_output<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Some(fence_start) = response.find("```json") {
        let after_fence = &response[fence_start + "```json".len()..];
        if let Some(json_start) = after_fence.find(|c: char| !c.is_whitespace()) {
            let json_body = &after_fence[json_start..];
            if let Some(fence_end) = json_body.find("```") {
                let json_str = json_body[..fence_end].trim();
                if let Ok(val) = serde_json::from_str(json_str) {
                    return Some(val);
                }
            }
        }
    }

    let trimmed = response.trim();
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                let candidate = &trimmed[start..=end];
                if let Ok(val) = serde_json::from_str(candidate) {
                    return Some(val);
                }
            }
        }
    }

    None
}
