//! # Aria Core — shared foundation for the voice conversation pipeline
//!
//! Data model, collaborator traits, error taxonomy, configuration, and prompt
//! construction. The pipeline itself lives in `aria-voice`; the local recall
//! store in `aria-memory`.

pub mod config;
pub mod error;
pub mod prompt;
pub mod traits;
pub mod types;

pub use config::PipelineConfig;
pub use error::{AriaError, AriaResult};
pub use prompt::{build_messages, DEFAULT_SYSTEM_PROMPT};
pub use traits::{
    ConversationStore, GenerationBackend, MemoryStore, SynthesisBackend, TranscriptionBackend,
    TranscriptionHandle,
};
pub use types::{
    AudioChunk, ChatMessage, GenerationRequest, MemoryHit, Role, TranscriptionEvent, Utterance,
};
