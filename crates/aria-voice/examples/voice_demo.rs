//! Interactive pipeline demo.
//!
//! Type a line, it enters the pipeline as speech; after a second of silence
//! the turn runs and the reply streams back. With `OPENAI_API_KEY` (or the
//! `LLM_*`/`TTS_*` variables) set, generation and synthesis go to the real
//! providers and the reply is spoken through the default output device;
//! without credentials the offline placeholders answer.
//!
//! ```text
//! cargo run -p aria-voice --example voice_demo
//! ```

use aria_core::{GenerationBackend, PipelineConfig, SynthesisBackend};
use aria_memory::RecallStore;
use aria_voice::{
    HttpGeneration, HttpSynthesis, LoopbackTranscription, PipelineEvent, PlaceholderGeneration,
    PlaceholderSynthesis, PlaybackSink, RodioSink, VoicePipeline,
};
use std::io::Write;
use std::sync::Arc;

struct SilentSink;

#[async_trait::async_trait]
impl PlaybackSink for SilentSink {
    async fn play(&self, _chunk: aria_core::AudioChunk) -> aria_core::AriaResult<()> {
        Ok(())
    }
    fn interrupt(&self) {}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = PipelineConfig::from_env()?;

    let generation: Arc<dyn GenerationBackend> = match HttpGeneration::from_env() {
        Ok(remote) => Arc::new(remote),
        Err(_) => {
            println!("no generation credentials, using the offline placeholder");
            Arc::new(PlaceholderGeneration::new())
        }
    };
    let synthesis: Arc<dyn SynthesisBackend> = match HttpSynthesis::from_env() {
        Ok(remote) => Arc::new(remote),
        Err(_) => Arc::new(PlaceholderSynthesis),
    };
    let sink: Arc<dyn PlaybackSink> = match RodioSink::new() {
        Ok(device) => Arc::new(device),
        Err(e) => {
            println!("no audio output ({}), replies stay text-only", e);
            Arc::new(SilentSink)
        }
    };

    let store = Arc::new(RecallStore::open(".aria-demo-memory")?.with_owner(&config.user_id));

    let mut pipeline = VoicePipeline::new(
        config,
        Arc::new(LoopbackTranscription),
        generation,
        synthesis,
        store.clone(),
        store,
        sink,
    );
    let mut events = pipeline
        .take_event_receiver()
        .ok_or_else(|| anyhow::anyhow!("event receiver already taken"))?;
    pipeline.start().await?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PipelineEvent::Transcript { text, is_final } if is_final => {
                    println!("you: {}", text);
                }
                PipelineEvent::Transcript { .. } => {}
                PipelineEvent::ResponsePartial { text } => {
                    print!("\raria: {}", text);
                    let _ = std::io::stdout().flush();
                }
                PipelineEvent::ResponseComplete { text } => {
                    println!("\raria: {}", text);
                }
                PipelineEvent::Error { stage, message } => {
                    println!("error ({:?}): {}", stage, message);
                }
            }
        }
    });

    println!("say something (empty line to quit):");
    let stdin = std::io::stdin();
    loop {
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }
        pipeline.send_audio(line.trim().as_bytes()).await?;
    }

    pipeline.stop().await?;
    Ok(())
}
