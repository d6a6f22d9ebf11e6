//! Collaborator contracts consumed by the pipeline core.
//!
//! Transcription, generation, synthesis, memory, and persistence are external
//! collaborators; the pipeline only orchestrates timing, ordering, and
//! lifecycle around them. Streaming is modeled as channels of events with an
//! explicit terminal result rather than nested callbacks.

use crate::error::AriaResult;
use crate::types::{AudioChunk, ChatMessage, GenerationRequest, MemoryHit, TranscriptionEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Live speech-to-text stream. Implementations deliver events (partials and
/// finals) on the provided channel until the returned handle is stopped.
/// Stream-level failures are delivered in-band as `Err` items; the pipeline
/// surfaces them and keeps listening.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn start_stream(
        &self,
        events: mpsc::UnboundedSender<AriaResult<TranscriptionEvent>>,
    ) -> AriaResult<Box<dyn TranscriptionHandle>>;
}

/// Handle to one live transcription stream.
#[async_trait]
pub trait TranscriptionHandle: Send + Sync {
    /// Forward one chunk of captured audio to the engine.
    async fn send_audio(&self, audio: &[u8]) -> AriaResult<()>;

    /// Close the stream. The event channel closes once delivery is done.
    async fn stop(&self) -> AriaResult<()>;
}

/// Streaming text generation. Incremental fragments are sent on `partials` in
/// generation order; the returned string is the complete final text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        request: GenerationRequest,
        partials: mpsc::Sender<String>,
    ) -> AriaResult<String>;
}

/// Streaming speech synthesis. Encoded audio fragments are sent on `chunks`
/// in stream order; returning `Ok` means the stream completed.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    async fn synthesize(&self, text: &str, chunks: mpsc::Sender<AudioChunk>) -> AriaResult<()>;
}

/// Read-only retrieval of conversational context.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The most recent messages of a conversation, oldest first.
    async fn recent_context(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> AriaResult<Vec<ChatMessage>>;

    /// Top-`k` prior messages relevant to `query`, best first.
    async fn search(&self, query: &str, user_id: &str, k: usize) -> AriaResult<Vec<MemoryHit>>;
}

/// Durable conversation log. Failures here are logged by callers and never
/// block a turn; conversation continuity wins over durability.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append_message(&self, conversation_id: &str, message: &ChatMessage) -> AriaResult<()>;
}
