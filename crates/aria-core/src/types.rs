//! Shared data model for the conversation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event from a live transcription stream.
///
/// Partials (`is_final == false`) are informational only (live captioning);
/// they never accumulate into an utterance.
#[derive(Debug, Clone)]
pub struct TranscriptionEvent {
    pub text: String,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptionEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            timestamp: Utc::now(),
        }
    }

    pub fn finalized(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            timestamp: Utc::now(),
        }
    }
}

/// One complete user input: finalized transcription segments joined by spaces,
/// committed after a silence window. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
}

/// An encoded audio fragment awaiting playback. Ordering is implicit in
/// arrival; a chunk is dropped after it has been played.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub data: Vec<u8>,
}

impl AudioChunk {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Speaker role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a conversation, as stored and as sent to generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A past message surfaced by relevance search, with its score.
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub content: String,
    pub score: f32,
    pub timestamp: DateTime<Utc>,
}

/// Request for one streaming generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
}
