//! Transcription backends.

use super::{env_any, require_key};
use aria_core::{AriaError, AriaResult, TranscriptionBackend, TranscriptionEvent, TranscriptionHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
const DEFAULT_MODEL: &str = "whisper-1";
const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Wrap raw PCM16 mono samples in a minimal WAV container.
fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    let byte_rate = sample_rate * 2;
    let data_len = pcm.len() as u32;
    let mut wav = Vec::with_capacity(44 + pcm.len());
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(36 + data_len).to_le_bytes());
    wav.extend_from_slice(b"WAVE");
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes());
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
    wav.extend_from_slice(&1u16.to_le_bytes()); // mono
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&2u16.to_le_bytes()); // block align
    wav.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&data_len.to_le_bytes());
    wav.extend_from_slice(pcm);
    wav
}

struct RemoteStt {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    sample_rate: u32,
}

impl RemoteStt {
    /// Transcribe one buffered window of PCM16 audio.
    async fn transcribe(&self, pcm: Vec<u8>) -> AriaResult<String> {
        let wav = pcm16_to_wav(&pcm, self.sample_rate);
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| AriaError::Transcription(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AriaError::Transcription(format!("request failed: {}", e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AriaError::Transcription(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AriaError::Transcription(format!("bad response body: {}", e)))?;
        Ok(value["text"].as_str().unwrap_or_default().to_string())
    }
}

/// Batch-windowed client for an OpenAI-compatible `/audio/transcriptions`
/// endpoint. Incoming PCM16 audio is buffered and shipped one window at a
/// time; each non-empty result arrives as a finalized event. An engine that
/// pushes true partials would emit them too; this one does not.
pub struct HttpTranscription {
    stt: Arc<RemoteStt>,
    flush_bytes: usize,
}

impl HttpTranscription {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        sample_rate: u32,
    ) -> Self {
        let stt = Arc::new(RemoteStt {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            sample_rate,
        });
        // Two seconds of 16-bit mono audio per request window.
        let flush_bytes = (sample_rate as usize) * 2 * 2;
        Self { stt, flush_bytes }
    }

    /// Configure from `STT_API_URL`, `STT_API_KEY` (falling back to
    /// `OPENAI_API_KEY`), `STT_MODEL`, and `STT_SAMPLE_RATE`.
    pub fn from_env() -> AriaResult<Self> {
        let api_url = env_any(&["STT_API_URL"]).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_key = require_key(&["STT_API_KEY", "OPENAI_API_KEY"], "transcription")?;
        let model = env_any(&["STT_MODEL"]).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let sample_rate = match env_any(&["STT_SAMPLE_RATE"]) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| AriaError::Config(format!("STT_SAMPLE_RATE is not a valid value: {}", raw)))?,
            None => DEFAULT_SAMPLE_RATE,
        };
        Ok(Self::new(api_url, api_key, model, sample_rate))
    }
}

struct HttpHandle {
    stt: Arc<RemoteStt>,
    flush_bytes: usize,
    buffer: Mutex<Vec<u8>>,
    events: Mutex<Option<mpsc::UnboundedSender<AriaResult<TranscriptionEvent>>>>,
}

impl HttpHandle {
    async fn flush(&self, pcm: Vec<u8>) -> AriaResult<()> {
        if pcm.is_empty() {
            return Ok(());
        }
        let events = self.events.lock().clone();
        let Some(events) = events else {
            return Ok(());
        };
        match self.stt.transcribe(pcm).await {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    let _ = events.send(Ok(TranscriptionEvent::finalized(text)));
                }
            }
            // In-band: the stream survives one failed window.
            Err(e) => {
                let _ = events.send(Err(e));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TranscriptionHandle for HttpHandle {
    async fn send_audio(&self, audio: &[u8]) -> AriaResult<()> {
        let window = {
            let mut buffer = self.buffer.lock();
            buffer.extend_from_slice(audio);
            if buffer.len() >= self.flush_bytes {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };
        match window {
            Some(pcm) => self.flush(pcm).await,
            None => Ok(()),
        }
    }

    async fn stop(&self) -> AriaResult<()> {
        let remainder = std::mem::take(&mut *self.buffer.lock());
        self.flush(remainder).await?;
        // Dropping the sender closes the event channel.
        self.events.lock().take();
        debug!("transcription stream stopped");
        Ok(())
    }
}

#[async_trait]
impl TranscriptionBackend for HttpTranscription {
    async fn start_stream(
        &self,
        events: mpsc::UnboundedSender<AriaResult<TranscriptionEvent>>,
    ) -> AriaResult<Box<dyn TranscriptionHandle>> {
        Ok(Box::new(HttpHandle {
            stt: Arc::clone(&self.stt),
            flush_bytes: self.flush_bytes,
            buffer: Mutex::new(Vec::new()),
            events: Mutex::new(Some(events)),
        }))
    }
}

/// Offline stand-in: interprets each audio buffer as UTF-8 text and echoes it
/// back as one finalized event. Lets the whole pipeline run from typed input.
pub struct LoopbackTranscription;

struct LoopbackHandle {
    events: Mutex<Option<mpsc::UnboundedSender<AriaResult<TranscriptionEvent>>>>,
}

#[async_trait]
impl TranscriptionHandle for LoopbackHandle {
    async fn send_audio(&self, audio: &[u8]) -> AriaResult<()> {
        let text = String::from_utf8_lossy(audio);
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let events = self.events.lock().clone();
        if let Some(events) = events {
            let _ = events.send(Ok(TranscriptionEvent::finalized(text)));
        }
        Ok(())
    }

    async fn stop(&self) -> AriaResult<()> {
        self.events.lock().take();
        Ok(())
    }
}

#[async_trait]
impl TranscriptionBackend for LoopbackTranscription {
    async fn start_stream(
        &self,
        events: mpsc::UnboundedSender<AriaResult<TranscriptionEvent>>,
    ) -> AriaResult<Box<dyn TranscriptionHandle>> {
        Ok(Box::new(LoopbackHandle {
            events: Mutex::new(Some(events)),
        }))
    }
}
