//! Pipeline controller: wires the transcription stream, the utterance
//! accumulator, the turn processor, and the playback queue together.
//!
//! `start` opens the transcription stream and spawns the event loop; `stop`
//! silences the pipeline immediately (playback cleared, session bumped) while
//! an in-flight turn winds down cooperatively and has its results discarded.

use crate::accumulator::UtteranceAccumulator;
use crate::event::{ErrorStage, PipelineEvent};
use crate::playback::{PlaybackQueue, PlaybackSink};
use crate::state::PipelineShared;
use crate::turn::TurnProcessor;
use aria_core::{
    AriaError, AriaResult, ConversationStore, GenerationBackend, MemoryStore, PipelineConfig,
    SynthesisBackend, TranscriptionBackend, TranscriptionEvent, TranscriptionHandle,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// A live voice conversation. One instance per conversation; all state is
/// instance-local so several pipelines can coexist in one process.
pub struct VoicePipeline {
    config: PipelineConfig,
    transcription: Arc<dyn TranscriptionBackend>,
    turn: Arc<TurnProcessor>,
    playback: Arc<PlaybackQueue>,
    shared: Arc<PipelineShared>,
    events_rx: Option<mpsc::UnboundedReceiver<PipelineEvent>>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    handle: Option<Box<dyn TranscriptionHandle>>,
    loop_task: Option<JoinHandle<()>>,
}

impl VoicePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        transcription: Arc<dyn TranscriptionBackend>,
        generation: Arc<dyn GenerationBackend>,
        synthesis: Arc<dyn SynthesisBackend>,
        memory: Arc<dyn MemoryStore>,
        store: Arc<dyn ConversationStore>,
        sink: Arc<dyn PlaybackSink>,
    ) -> Self {
        let shared = Arc::new(PipelineShared::new());
        let playback = PlaybackQueue::new(sink);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let turn = Arc::new(TurnProcessor::new(
            config.clone(),
            generation,
            synthesis,
            memory,
            store,
            Arc::clone(&playback),
            Arc::clone(&shared),
            events_tx.clone(),
        ));
        Self {
            config,
            transcription,
            turn,
            playback,
            shared,
            events_rx: Some(events_rx),
            events_tx,
            handle: None,
            loop_task: None,
        }
    }

    /// Take the host-facing event channel. Yields `Some` once.
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<PipelineEvent>> {
        self.events_rx.take()
    }

    /// Open the transcription stream and begin segmenting utterances.
    pub async fn start(&mut self) -> AriaResult<()> {
        if self.shared.is_listening() {
            return Err(AriaError::Pipeline("pipeline already started".to_string()));
        }
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        let handle = self.transcription.start_stream(stream_tx).await?;
        self.handle = Some(handle);
        self.shared.set_listening(true);

        let loop_task = tokio::spawn(event_loop(
            Arc::clone(&self.shared),
            Arc::clone(&self.turn),
            self.events_tx.clone(),
            stream_rx,
            self.config.silence_window,
        ));
        self.loop_task = Some(loop_task);
        info!(
            conversation = %self.config.conversation_id,
            "voice pipeline listening"
        );
        Ok(())
    }

    /// Stop listening and go silent now. Queued audio is dropped, the current
    /// chunk is cut, and any in-flight turn finishes in the background with
    /// its events and audio discarded.
    pub async fn stop(&mut self) -> AriaResult<()> {
        if !self.shared.is_listening() {
            return Ok(());
        }
        self.shared.set_listening(false);
        self.shared.bump_session();
        if let Some(task) = self.loop_task.take() {
            task.abort();
        }
        let stop_result = match self.handle.take() {
            Some(handle) => handle.stop().await,
            None => Ok(()),
        };
        self.playback.clear();
        info!("voice pipeline stopped");
        stop_result
    }

    /// Forward captured audio to the transcription stream.
    pub async fn send_audio(&self, audio: &[u8]) -> AriaResult<()> {
        match &self.handle {
            Some(handle) => handle.send_audio(audio).await,
            None => Err(AriaError::Pipeline("pipeline not started".to_string())),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.shared.is_listening()
    }

    /// Whether a conversation turn is currently being processed.
    pub fn is_processing(&self) -> bool {
        self.shared.is_processing()
    }

    /// Whether synthesized audio is queued or sounding.
    pub fn is_speaking(&self) -> bool {
        self.playback.is_playing()
    }
}

/// Consumes transcription events, runs the silence debounce, and hands
/// committed utterances to the turn processor.
async fn event_loop(
    shared: Arc<PipelineShared>,
    turn: Arc<TurnProcessor>,
    events: mpsc::UnboundedSender<PipelineEvent>,
    mut stream: mpsc::UnboundedReceiver<AriaResult<TranscriptionEvent>>,
    silence_window: std::time::Duration,
) {
    let mut accumulator = UtteranceAccumulator::new(silence_window);
    loop {
        let deadline = accumulator.deadline();
        tokio::select! {
            received = stream.recv() => {
                match received {
                    Some(Ok(event)) => {
                        let _ = events.send(PipelineEvent::Transcript {
                            text: event.text.clone(),
                            is_final: event.is_final,
                        });
                        accumulator.on_event(&event);
                    }
                    Some(Err(e)) => {
                        // Stream errors do not stop the pipeline; keep listening.
                        warn!("transcription stream error: {}", e);
                        let _ = events.send(PipelineEvent::Error {
                            stage: ErrorStage::Transcription,
                            message: e.to_string(),
                        });
                    }
                    None => {
                        debug!("transcription stream closed, event loop ending");
                        break;
                    }
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if shared.is_processing() {
                    if accumulator.has_buffered_text() {
                        // A turn is active; hold the buffer for the next window.
                        accumulator.defer();
                    } else {
                        // Timer armed by empty input; nothing to hold.
                        let _ = accumulator.take_utterance();
                    }
                } else if let Some(utterance) = accumulator.take_utterance() {
                    let turn = Arc::clone(&turn);
                    tokio::spawn(async move { turn.process(utterance).await });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::{AudioChunk, ChatMessage, GenerationRequest, MemoryHit, Utterance};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct NullBackend;

    #[async_trait]
    impl GenerationBackend for NullBackend {
        async fn generate(
            &self,
            _request: GenerationRequest,
            _partials: mpsc::Sender<String>,
        ) -> AriaResult<String> {
            Ok(String::new())
        }
    }

    #[async_trait]
    impl SynthesisBackend for NullBackend {
        async fn synthesize(&self, _: &str, _: mpsc::Sender<AudioChunk>) -> AriaResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl MemoryStore for NullBackend {
        async fn recent_context(&self, _: &str, _: usize) -> AriaResult<Vec<ChatMessage>> {
            Ok(Vec::new())
        }
        async fn search(&self, _: &str, _: &str, _: usize) -> AriaResult<Vec<MemoryHit>> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl ConversationStore for NullBackend {
        async fn append_message(&self, _: &str, _: &ChatMessage) -> AriaResult<()> {
            Ok(())
        }
    }

    struct NullSink;

    #[async_trait]
    impl crate::playback::PlaybackSink for NullSink {
        async fn play(&self, _: AudioChunk) -> AriaResult<()> {
            Ok(())
        }
        fn interrupt(&self) {}
    }

    /// Hands the event sender back to the test through shared state.
    struct ManualTranscription {
        sender: Mutex<Option<mpsc::UnboundedSender<AriaResult<TranscriptionEvent>>>>,
    }

    struct ManualHandle;

    #[async_trait]
    impl TranscriptionHandle for ManualHandle {
        async fn send_audio(&self, _: &[u8]) -> AriaResult<()> {
            Ok(())
        }
        async fn stop(&self) -> AriaResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl TranscriptionBackend for ManualTranscription {
        async fn start_stream(
            &self,
            events: mpsc::UnboundedSender<AriaResult<TranscriptionEvent>>,
        ) -> AriaResult<Box<dyn TranscriptionHandle>> {
            *self.sender.lock() = Some(events);
            Ok(Box::new(ManualHandle))
        }
    }

    fn pipeline_with(backend: Arc<ManualTranscription>) -> VoicePipeline {
        let null = Arc::new(NullBackend);
        VoicePipeline::new(
            PipelineConfig::default(),
            backend,
            null.clone(),
            null.clone(),
            null.clone(),
            null,
            Arc::new(NullSink),
        )
    }

    #[tokio::test]
    async fn start_twice_is_an_error() {
        let backend = Arc::new(ManualTranscription {
            sender: Mutex::new(None),
        });
        let mut pipeline = pipeline_with(backend);
        pipeline.start().await.unwrap();
        assert!(pipeline.start().await.is_err());
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let backend = Arc::new(ManualTranscription {
            sender: Mutex::new(None),
        });
        let mut pipeline = pipeline_with(backend);
        pipeline.stop().await.unwrap();
        assert!(!pipeline.is_listening());
    }

    #[tokio::test]
    async fn restart_after_stop_works() {
        let backend = Arc::new(ManualTranscription {
            sender: Mutex::new(None),
        });
        let mut pipeline = pipeline_with(backend);
        pipeline.start().await.unwrap();
        pipeline.stop().await.unwrap();
        pipeline.start().await.unwrap();
        assert!(pipeline.is_listening());
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn send_audio_before_start_is_an_error() {
        let backend = Arc::new(ManualTranscription {
            sender: Mutex::new(None),
        });
        let pipeline = pipeline_with(backend);
        assert!(pipeline.send_audio(b"pcm").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn transcripts_are_forwarded_and_utterance_commits_after_silence() {
        let backend = Arc::new(ManualTranscription {
            sender: Mutex::new(None),
        });
        let mut pipeline = pipeline_with(backend.clone());
        let mut events = pipeline.take_event_receiver().expect("receiver");
        pipeline.start().await.unwrap();

        let tx = backend.sender.lock().clone().expect("stream open");
        tx.send(Ok(TranscriptionEvent::partial("hel"))).unwrap();
        tx.send(Ok(TranscriptionEvent::finalized("hello"))).unwrap();
        tokio::task::yield_now().await;

        let first = events.recv().await.expect("partial forwarded");
        assert!(matches!(
            first,
            PipelineEvent::Transcript { is_final: false, .. }
        ));
        let second = events.recv().await.expect("final forwarded");
        assert!(matches!(
            second,
            PipelineEvent::Transcript { is_final: true, .. }
        ));

        // The silence window elapses and the turn runs with the null backends.
        tokio::time::advance(std::time::Duration::from_millis(1001)).await;
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert!(!pipeline.is_processing());
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn in_band_stream_error_keeps_listening() {
        let backend = Arc::new(ManualTranscription {
            sender: Mutex::new(None),
        });
        let mut pipeline = pipeline_with(backend.clone());
        let mut events = pipeline.take_event_receiver().expect("receiver");
        pipeline.start().await.unwrap();

        let tx = backend.sender.lock().clone().expect("stream open");
        tx.send(Err(AriaError::Transcription("engine hiccup".to_string())))
            .unwrap();

        let event = events.recv().await.expect("error surfaced");
        assert!(matches!(
            event,
            PipelineEvent::Error {
                stage: ErrorStage::Transcription,
                ..
            }
        ));
        assert!(pipeline.is_listening());
        pipeline.stop().await.unwrap();
    }

    // Suppressing empty utterances end to end: a whitespace-only final arms
    // the timer but commits nothing, so no turn ever starts.
    #[tokio::test(start_paused = true)]
    async fn whitespace_final_never_starts_a_turn() {
        let backend = Arc::new(ManualTranscription {
            sender: Mutex::new(None),
        });
        let mut pipeline = pipeline_with(backend.clone());
        let _events = pipeline.take_event_receiver();
        pipeline.start().await.unwrap();

        let tx = backend.sender.lock().clone().expect("stream open");
        tx.send(Ok(TranscriptionEvent::finalized("   "))).unwrap();
        tokio::task::yield_now().await;
        tokio::time::advance(std::time::Duration::from_millis(1500)).await;
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert!(!pipeline.is_processing());
        pipeline.stop().await.unwrap();
    }

    /// Counts calls and holds each one open until the gate fires.
    struct GatedGeneration {
        calls: AtomicUsize,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl GenerationBackend for GatedGeneration {
        async fn generate(
            &self,
            _request: GenerationRequest,
            _partials: mpsc::Sender<String>,
        ) -> AriaResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok("held reply".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_during_a_turn_does_not_hold_the_timer() {
        let backend = Arc::new(ManualTranscription {
            sender: Mutex::new(None),
        });
        let gate = Arc::new(Notify::new());
        let generation = Arc::new(GatedGeneration {
            calls: AtomicUsize::new(0),
            gate: gate.clone(),
        });
        let null = Arc::new(NullBackend);
        let mut pipeline = VoicePipeline::new(
            PipelineConfig::default(),
            backend.clone(),
            generation.clone(),
            null.clone(),
            null.clone(),
            null,
            Arc::new(NullSink),
        );
        let _events = pipeline.take_event_receiver();
        pipeline.start().await.unwrap();

        let tx = backend.sender.lock().clone().expect("stream open");
        tx.send(Ok(TranscriptionEvent::finalized("go"))).unwrap();
        tokio::task::yield_now().await;
        tokio::time::advance(std::time::Duration::from_millis(1001)).await;
        while generation.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // Whitespace arrives while the turn is held open; its window lapses
        // with nothing buffered, so the timer is dropped, not deferred.
        tx.send(Ok(TranscriptionEvent::finalized("   "))).unwrap();
        tokio::task::yield_now().await;
        tokio::time::advance(std::time::Duration::from_millis(1001)).await;
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }

        gate.notify_one();
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert!(!pipeline.is_processing());

        // No timer survived, so no second turn ever starts.
        tokio::time::advance(std::time::Duration::from_millis(3000)).await;
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(generation.calls.load(Ordering::SeqCst), 1);
        pipeline.stop().await.unwrap();
    }

    #[allow(dead_code)]
    fn assert_send<T: Send>() {}

    #[test]
    fn pipeline_handles_are_send() {
        assert_send::<Utterance>();
        assert_send::<PipelineEvent>();
    }
}
