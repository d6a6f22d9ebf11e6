//! Error types for the conversation pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type AriaResult<T> = Result<T, AriaError>;

/// Errors that can occur across the pipeline and its collaborators.
#[derive(Error, Debug)]
pub enum AriaError {
    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("Memory retrieval error: {0}")]
    Memory(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pipeline state error: {0}")]
    Pipeline(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}
