//! Utterance segmentation: debounce finalized transcription into utterances.
//!
//! Every finalized event appends its text and re-arms the silence deadline;
//! when the deadline elapses the buffered segments become one `Utterance`.
//! Finalized events with gaps shorter than the window coalesce — that is the
//! intended behavior. The deadline is an explicit value the owning event loop
//! polls with `sleep_until`, so tests run against tokio's paused clock.

use aria_core::{TranscriptionEvent, Utterance};
use std::time::Duration;
use tokio::time::Instant;

pub struct UtteranceAccumulator {
    silence_window: Duration,
    segments: Vec<String>,
    deadline: Option<Instant>,
}

impl UtteranceAccumulator {
    pub fn new(silence_window: Duration) -> Self {
        Self {
            silence_window,
            segments: Vec::new(),
            deadline: None,
        }
    }

    /// Feed one transcription event. Partials never change state; finals
    /// append their text and restart the silence timer.
    pub fn on_event(&mut self, event: &TranscriptionEvent) {
        if !event.is_final {
            return;
        }
        let text = event.text.trim();
        if !text.is_empty() {
            self.segments.push(text.to_string());
        }
        self.deadline = Some(Instant::now() + self.silence_window);
    }

    /// When the buffered segments should commit, if a timer is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Push the deadline out one more window without touching the buffer.
    /// Used while a turn is active so buffered input is retained, not lost.
    pub fn defer(&mut self) {
        self.deadline = Some(Instant::now() + self.silence_window);
    }

    /// Commit the buffer. Clears segments and deadline; returns `None` when
    /// the trimmed buffer is empty (an empty buffer never emits).
    pub fn take_utterance(&mut self) -> Option<Utterance> {
        self.deadline = None;
        let text = self.segments.join(" ");
        self.segments.clear();
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(Utterance {
                text: text.to_string(),
            })
        }
    }

    pub fn has_buffered_text(&self) -> bool {
        !self.segments.is_empty()
    }
}
