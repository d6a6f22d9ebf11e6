//! # Aria Voice — real-time voice conversation pipeline
//!
//! Turns a live transcription stream into silence-separated utterances, drives
//! one generation turn per utterance, and plays synthesized speech back as it
//! streams in. One turn in flight at a time; playback order equals generation
//! order.
//!
//! ```text
//! audio in → TranscriptionBackend → events → UtteranceAccumulator
//!                                               │ silence window
//!                                               ▼
//!                        TurnProcessor (single-flight)
//!                   recall → prompt → streaming generation
//!                                               │ final text
//!                                               ▼
//!                  SynthesisBackend → PlaybackQueue → speaker
//! ```

pub mod accumulator;
pub mod backends;
pub mod event;
pub mod pipeline;
pub mod playback;
pub mod state;
pub mod turn;

pub use accumulator::UtteranceAccumulator;
pub use backends::generation::{HttpGeneration, PlaceholderGeneration};
pub use backends::synthesis::{HttpSynthesis, PlaceholderSynthesis};
pub use backends::transcription::{HttpTranscription, LoopbackTranscription};
pub use event::{ErrorStage, PipelineEvent};
pub use pipeline::VoicePipeline;
pub use playback::{PlaybackQueue, PlaybackSink, RodioSink};
pub use state::PipelineShared;
pub use turn::TurnProcessor;
