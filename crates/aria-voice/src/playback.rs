//! Ordered playback of synthesized audio.
//!
//! `PlaybackQueue` buffers chunks in arrival order and drains them one at a
//! time: the next chunk starts only after the previous finished. A chunk that
//! arrives while draining is picked up on the next loop iteration. `clear`
//! empties the queue and cuts the current chunk without waiting for it.
//!
//! Decoding and playing one chunk to completion sits behind the
//! `PlaybackSink` trait; the rodio implementation keeps its output stream on a
//! dedicated thread because the handle cannot move between threads.

use aria_core::{AriaError, AriaResult, AudioChunk};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Plays one chunk to completion. Seam between the queue and the device.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Decode and play `chunk`, returning once it has finished sounding.
    async fn play(&self, chunk: AudioChunk) -> AriaResult<()>;

    /// Best-effort: cut whatever is currently sounding.
    fn interrupt(&self);
}

/// FIFO queue of audio chunks plus the drain loop that plays them.
pub struct PlaybackQueue {
    sink: Arc<dyn PlaybackSink>,
    queue: Mutex<VecDeque<AudioChunk>>,
    playing: AtomicBool,
}

impl PlaybackQueue {
    pub fn new(sink: Arc<dyn PlaybackSink>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            queue: Mutex::new(VecDeque::new()),
            playing: AtomicBool::new(false),
        })
    }

    /// Append a chunk; starts the drain loop if playback is idle.
    pub fn enqueue(self: &Arc<Self>, chunk: AudioChunk) {
        if chunk.is_empty() {
            return;
        }
        self.queue.lock().push_back(chunk);
        if self
            .playing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.drain().await });
        }
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let next = self.queue.lock().pop_front();
            match next {
                Some(chunk) => {
                    // A failed chunk is skipped; partial audio beats silence.
                    if let Err(e) = self.sink.play(chunk).await {
                        warn!("playback failed for one chunk, skipping: {}", e);
                    }
                }
                None => {
                    self.playing.store(false, Ordering::Release);
                    // A chunk may have slipped in between the empty pop and
                    // going idle; reclaim the drain if so.
                    let refill = !self.queue.lock().is_empty()
                        && self
                            .playing
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok();
                    if !refill {
                        return;
                    }
                }
            }
        }
    }

    /// Whether a drain loop is active (a chunk is sounding or pending).
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Drop all queued audio and cut the current chunk. Playback returns to
    /// idle once the drain loop observes the empty queue.
    pub fn clear(&self) {
        let dropped = {
            let mut queue = self.queue.lock();
            let n = queue.len();
            queue.clear();
            n
        };
        self.sink.interrupt();
        if dropped > 0 {
            debug!("cleared {} queued audio chunks", dropped);
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

enum SinkState {
    Ready(Arc<rodio::Sink>),
    Failed(String),
}

/// Production sink: rodio output device.
///
/// The `OutputStream` handle is not `Send`, so a dedicated thread owns it for
/// the life of the sink; the `Sink` control handle is shared back and is safe
/// to drive from async tasks.
pub struct RodioSink {
    sink: Arc<rodio::Sink>,
    // Dropping this ends the holder thread, which drops the output stream.
    _shutdown: std::sync::mpsc::Sender<()>,
}

impl RodioSink {
    pub fn new() -> AriaResult<Self> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel::<()>();

        std::thread::spawn(move || {
            let built = rodio::OutputStream::try_default()
                .map_err(|e| e.to_string())
                .and_then(|(stream, handle)| {
                    rodio::Sink::try_new(&handle)
                        .map(|sink| (stream, handle, Arc::new(sink)))
                        .map_err(|e| e.to_string())
                });
            match built {
                Ok((_stream, _handle, sink)) => {
                    let _ = ready_tx.send(SinkState::Ready(Arc::clone(&sink)));
                    // Keep the output stream alive until the sink is dropped.
                    let _ = shutdown_rx.recv();
                }
                Err(e) => {
                    let _ = ready_tx.send(SinkState::Failed(e));
                }
            }
        });

        match ready_rx
            .recv()
            .map_err(|e| AriaError::Playback(e.to_string()))?
        {
            SinkState::Ready(sink) => Ok(Self {
                sink,
                _shutdown: shutdown_tx,
            }),
            SinkState::Failed(e) => Err(AriaError::Playback(e)),
        }
    }
}

#[async_trait]
impl PlaybackSink for RodioSink {
    async fn play(&self, chunk: AudioChunk) -> AriaResult<()> {
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || {
            let source = rodio::Decoder::new(Cursor::new(chunk.data))
                .map_err(|e| AriaError::Playback(format!("decode failed: {}", e)))?;
            use rodio::Source;
            sink.append(source.convert_samples::<f32>());
            sink.sleep_until_end();
            Ok(())
        })
        .await
        .map_err(|e| AriaError::Playback(e.to_string()))?
    }

    fn interrupt(&self) {
        self.sink.stop();
    }
}
