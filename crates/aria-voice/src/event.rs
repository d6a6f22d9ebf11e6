//! Events the pipeline delivers to its host application.

use serde::Serialize;

/// Which part of the pipeline an error came from. Input errors leave the
/// pipeline listening; turn errors end the turn; synthesis errors arrive after
/// the text response was already delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Transcription,
    Turn,
    Synthesis,
}

/// Host-facing pipeline events, delivered in order on one channel.
/// Serializable so hosts can forward them to a UI as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Live transcription text. Partials are for captioning only.
    Transcript { text: String, is_final: bool },
    /// The full response so far; grows monotonically within one turn.
    ResponsePartial { text: String },
    /// Terminal text of one turn.
    ResponseComplete { text: String },
    /// A failure, tagged with where it happened.
    Error { stage: ErrorStage, message: String },
}
