//! One conversation turn: recall → prompt → streaming generation → persist →
//! streaming synthesis into the playback queue.
//!
//! Turns are single-flight. The guard is released by a drop guard so it runs
//! on every exit path, including errors and panics inside a step. A turn
//! request arriving while one is active is dropped, not queued; the
//! accumulator retains its buffer in that case, so the input is not lost.

use crate::event::{ErrorStage, PipelineEvent};
use crate::playback::PlaybackQueue;
use crate::state::PipelineShared;
use aria_core::{
    build_messages, AriaError, AriaResult, ChatMessage, ConversationStore, GenerationBackend,
    GenerationRequest, MemoryStore, PipelineConfig, Role, SynthesisBackend, Utterance,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Releases the single-flight guard on drop, whatever the exit path was.
struct TurnGuard {
    shared: Arc<PipelineShared>,
}

impl TurnGuard {
    fn acquire(shared: &Arc<PipelineShared>) -> Option<Self> {
        if shared.try_begin_turn() {
            Some(Self {
                shared: Arc::clone(shared),
            })
        } else {
            None
        }
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.shared.end_turn();
    }
}

/// Drives one utterance through generation and synthesis.
pub struct TurnProcessor {
    config: PipelineConfig,
    generation: Arc<dyn GenerationBackend>,
    synthesis: Arc<dyn SynthesisBackend>,
    memory: Arc<dyn MemoryStore>,
    store: Arc<dyn ConversationStore>,
    playback: Arc<PlaybackQueue>,
    shared: Arc<PipelineShared>,
    events: mpsc::UnboundedSender<PipelineEvent>,
}

impl TurnProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        generation: Arc<dyn GenerationBackend>,
        synthesis: Arc<dyn SynthesisBackend>,
        memory: Arc<dyn MemoryStore>,
        store: Arc<dyn ConversationStore>,
        playback: Arc<PlaybackQueue>,
        shared: Arc<PipelineShared>,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Self {
        Self {
            config,
            generation,
            synthesis,
            memory,
            store,
            playback,
            shared,
            events,
        }
    }

    /// Run one turn. No-op if a turn is already active.
    pub async fn process(&self, utterance: Utterance) {
        let Some(_guard) = TurnGuard::acquire(&self.shared) else {
            debug!("turn already active, dropping utterance: {:?}", utterance.text);
            return;
        };
        let session = self.shared.current_session();
        info!("turn started: {:?}", utterance.text);

        match self.run(&utterance, session).await {
            Ok(()) => debug!("turn finished"),
            Err(e) => {
                warn!("turn failed: {}", e);
                self.emit(
                    session,
                    PipelineEvent::Error {
                        stage: ErrorStage::Turn,
                        message: e.to_string(),
                    },
                );
            }
        }
    }

    async fn run(&self, utterance: &Utterance, session: u64) -> AriaResult<()> {
        // Recall: recent context plus top-K relevant prior messages.
        let recent = self
            .memory
            .recent_context(&self.config.conversation_id, self.config.context_limit)
            .await?;
        let memories = self
            .memory
            .search(&utterance.text, &self.config.user_id, self.config.memory_top_k)
            .await?;

        let messages = build_messages(
            &self.config.system_prompt,
            &memories,
            &recent,
            &utterance.text,
        );
        let request = GenerationRequest {
            messages,
            temperature: Some(self.config.temperature),
        };

        // Stream generation; every fragment extends the response and the host
        // always sees the full text so far.
        let (partials_tx, mut partials_rx) = mpsc::channel(32);
        let generation = Arc::clone(&self.generation);
        let limit = self.config.turn_timeout;
        let generating = tokio::spawn(async move {
            match timeout(limit, generation.generate(request, partials_tx)).await {
                Ok(result) => result,
                Err(_) => Err(AriaError::Timeout("generation".to_string())),
            }
        });

        let mut response = String::new();
        while let Some(fragment) = partials_rx.recv().await {
            response.push_str(&fragment);
            self.emit(
                session,
                PipelineEvent::ResponsePartial {
                    text: response.clone(),
                },
            );
        }
        let final_text = generating
            .await
            .map_err(|e| AriaError::Generation(e.to_string()))??;
        let final_text = if final_text.trim().is_empty() {
            response
        } else {
            final_text
        };
        self.emit(
            session,
            PipelineEvent::ResponseComplete {
                text: final_text.clone(),
            },
        );

        // Persistence never blocks or fails a turn.
        let conversation = &self.config.conversation_id;
        if let Err(e) = self
            .store
            .append_message(conversation, &ChatMessage::new(Role::User, &utterance.text))
            .await
        {
            warn!("failed to persist user message: {}", e);
        }
        if let Err(e) = self
            .store
            .append_message(conversation, &ChatMessage::new(Role::Assistant, &final_text))
            .await
        {
            warn!("failed to persist assistant message: {}", e);
        }

        // A synthesis failure surfaces but does not retract the text response
        // the host already received.
        if let Err(e) = self.speak(&final_text, session).await {
            warn!("synthesis failed after response delivery: {}", e);
            self.emit(
                session,
                PipelineEvent::Error {
                    stage: ErrorStage::Synthesis,
                    message: e.to_string(),
                },
            );
        }
        Ok(())
    }

    /// Stream synthesized audio into the playback queue, in stream order.
    async fn speak(&self, text: &str, session: u64) -> AriaResult<()> {
        if text.trim().is_empty() {
            return Ok(());
        }
        let (chunks_tx, mut chunks_rx) = mpsc::channel(32);
        let synthesis = Arc::clone(&self.synthesis);
        let spoken = text.to_string();
        let limit = self.config.turn_timeout;
        let synthesizing = tokio::spawn(async move {
            match timeout(limit, synthesis.synthesize(&spoken, chunks_tx)).await {
                Ok(result) => result,
                Err(_) => Err(AriaError::Timeout("synthesis".to_string())),
            }
        });

        while let Some(chunk) = chunks_rx.recv().await {
            if self.shared.current_session() != session {
                debug!("discarding audio from a stopped session");
                continue;
            }
            self.playback.enqueue(chunk);
        }
        synthesizing
            .await
            .map_err(|e| AriaError::Synthesis(e.to_string()))??;
        Ok(())
    }

    /// Deliver an event unless the session changed underneath the turn.
    fn emit(&self, session: u64, event: PipelineEvent) {
        if self.shared.current_session() != session {
            debug!("discarding event from a stopped session");
            return;
        }
        let _ = self.events.send(event);
    }
}
