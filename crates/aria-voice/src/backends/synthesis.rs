//! Speech synthesis backends.

use super::{env_any, require_key};
use aria_core::{AriaError, AriaResult, AudioChunk, SynthesisBackend};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/audio/speech";
const DEFAULT_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";

/// Streaming client for an OpenAI-compatible `/audio/speech` endpoint.
/// Response bytes are forwarded as chunks while the body downloads, so
/// playback starts before synthesis finishes.
pub struct HttpSynthesis {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    voice: String,
}

impl HttpSynthesis {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            voice: DEFAULT_VOICE.to_string(),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    /// Configure from `TTS_API_URL`, `TTS_API_KEY` (falling back to
    /// `OPENAI_API_KEY`), `TTS_MODEL`, and `TTS_VOICE`.
    pub fn from_env() -> AriaResult<Self> {
        let api_url = env_any(&["TTS_API_URL"]).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_key = require_key(&["TTS_API_KEY", "OPENAI_API_KEY"], "synthesis")?;
        let model = env_any(&["TTS_MODEL"]).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let mut backend = Self::new(api_url, api_key, model);
        if let Some(voice) = env_any(&["TTS_VOICE"]) {
            backend.voice = voice;
        }
        Ok(backend)
    }
}

#[async_trait]
impl SynthesisBackend for HttpSynthesis {
    async fn synthesize(&self, text: &str, chunks: mpsc::Sender<AudioChunk>) -> AriaResult<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let body = json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "mp3",
        });
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AriaError::Synthesis(format!("request failed: {}", e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AriaError::Synthesis(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        let mut stream = response.bytes_stream();
        let mut total = 0usize;
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| AriaError::Synthesis(format!("stream broke: {}", e)))?;
            total += bytes.len();
            if chunks.send(AudioChunk::new(bytes.to_vec())).await.is_err() {
                // Receiver gone; the turn was abandoned.
                return Ok(());
            }
        }
        debug!(bytes = total, "synthesis stream complete");
        Ok(())
    }
}

/// Offline stand-in: produces no audio. The pipeline behaves as if every
/// utterance synthesized instantly to silence.
pub struct PlaceholderSynthesis;

#[async_trait]
impl SynthesisBackend for PlaceholderSynthesis {
    async fn synthesize(&self, text: &str, _chunks: mpsc::Sender<AudioChunk>) -> AriaResult<()> {
        debug!(chars = text.len(), "placeholder synthesis, no audio produced");
        Ok(())
    }
}
