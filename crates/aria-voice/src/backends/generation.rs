//! Text generation backends.

use super::{env_any, require_key};
use aria_core::{AriaError, AriaResult, GenerationBackend, GenerationRequest, Role};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// One item of a chat-completions SSE stream.
enum SseItem {
    Fragment(String),
    Done,
}

/// Parse one SSE line. Non-data lines and unparseable payloads yield nothing;
/// a broken line in the middle of a stream is not worth failing the turn for.
fn parse_sse_line(line: &str) -> Option<SseItem> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseItem::Done);
    }
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    let fragment = value["choices"][0]["delta"]["content"].as_str()?;
    if fragment.is_empty() {
        None
    } else {
        Some(SseItem::Fragment(fragment.to_string()))
    }
}

/// Streaming client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpGeneration {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl HttpGeneration {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Configure from `LLM_API_URL`, `LLM_API_KEY` (falling back to
    /// `OPENAI_API_KEY`), and `LLM_MODEL`.
    pub fn from_env() -> AriaResult<Self> {
        let api_url = env_any(&["LLM_API_URL"]).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_key = require_key(&["LLM_API_KEY", "OPENAI_API_KEY"], "generation")?;
        let model = env_any(&["LLM_MODEL"]).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Self::new(api_url, api_key, model))
    }
}

#[async_trait]
impl GenerationBackend for HttpGeneration {
    async fn generate(
        &self,
        request: GenerationRequest,
        partials: mpsc::Sender<String>,
    ) -> AriaResult<String> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AriaError::Generation(format!("request failed: {}", e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AriaError::Generation(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full = String::new();
        'stream: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AriaError::Generation(format!("stream broke: {}", e)))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(newline) = buffer.find('\n') {
                let line: String = buffer.drain(..=newline).collect();
                match parse_sse_line(&line) {
                    Some(SseItem::Fragment(fragment)) => {
                        full.push_str(&fragment);
                        // The receiver hanging up just means nobody wants
                        // partials anymore.
                        let _ = partials.send(fragment).await;
                    }
                    Some(SseItem::Done) => break 'stream,
                    None => {}
                }
            }
        }
        debug!(chars = full.len(), "generation stream complete");
        Ok(full)
    }
}

/// Offline stand-in: streams a canned reply word by word.
pub struct PlaceholderGeneration {
    reply: Option<String>,
}

impl PlaceholderGeneration {
    pub fn new() -> Self {
        Self { reply: None }
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
        }
    }
}

impl Default for PlaceholderGeneration {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for PlaceholderGeneration {
    async fn generate(
        &self,
        request: GenerationRequest,
        partials: mpsc::Sender<String>,
    ) -> AriaResult<String> {
        let reply = match &self.reply {
            Some(reply) => reply.clone(),
            None => {
                let heard = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or("nothing");
                format!("I heard you say: {}", heard)
            }
        };
        let mut full = String::new();
        for word in reply.split_whitespace() {
            let fragment = if full.is_empty() {
                word.to_string()
            } else {
                format!(" {}", word)
            };
            full.push_str(&fragment);
            let _ = partials.send(fragment).await;
        }
        Ok(full)
    }
}
