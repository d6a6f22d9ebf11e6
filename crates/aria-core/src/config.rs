//! Pipeline configuration, environment-driven with sensible defaults.

use crate::error::{AriaError, AriaResult};
use crate::prompt::DEFAULT_SYSTEM_PROMPT;
use std::time::Duration;

/// Tunables for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Conversation the pipeline appends to and reads context from.
    pub conversation_id: String,
    /// User whose history is searched for relevant memories.
    pub user_id: String,
    /// Silence after the last finalized segment before an utterance commits
    /// (default 1000 ms).
    pub silence_window: Duration,
    /// How many relevant past messages to retrieve per turn (default 3).
    pub memory_top_k: usize,
    /// How many recent context messages to include in the prompt (default 10).
    pub context_limit: usize,
    /// Sampling temperature passed to generation (default 0.7).
    pub temperature: f32,
    /// Upper bound on one generation or synthesis call (default 60 s).
    pub turn_timeout: Duration,
    /// Fixed system instruction prefixed to every prompt.
    pub system_prompt: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            conversation_id: "default".to_string(),
            user_id: "default".to_string(),
            silence_window: Duration::from_millis(1000),
            memory_top_k: 3,
            context_limit: 10,
            temperature: 0.7,
            turn_timeout: Duration::from_secs(60),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> AriaResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AriaError::Config(format!("{} is not a valid value: {}", key, raw))),
        Err(_) => Ok(None),
    }
}

impl PipelineConfig {
    /// Build from environment: `ARIA_CONVERSATION_ID`, `ARIA_USER_ID`,
    /// `ARIA_SILENCE_MS`, `ARIA_MEMORY_TOP_K`, `ARIA_CONTEXT_LIMIT`,
    /// `ARIA_TEMPERATURE`, `ARIA_TURN_TIMEOUT_SECS`, `ARIA_SYSTEM_PROMPT`.
    /// Unset variables keep their defaults.
    pub fn from_env() -> AriaResult<Self> {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("ARIA_CONVERSATION_ID") {
            config.conversation_id = v;
        }
        if let Ok(v) = std::env::var("ARIA_USER_ID") {
            config.user_id = v;
        }
        if let Some(ms) = env_parsed::<u64>("ARIA_SILENCE_MS")? {
            config.silence_window = Duration::from_millis(ms);
        }
        if let Some(k) = env_parsed::<usize>("ARIA_MEMORY_TOP_K")? {
            config.memory_top_k = k;
        }
        if let Some(n) = env_parsed::<usize>("ARIA_CONTEXT_LIMIT")? {
            config.context_limit = n;
        }
        if let Some(t) = env_parsed::<f32>("ARIA_TEMPERATURE")? {
            config.temperature = t;
        }
        if let Some(secs) = env_parsed::<u64>("ARIA_TURN_TIMEOUT_SECS")? {
            config.turn_timeout = Duration::from_secs(secs);
        }
        if let Ok(v) = std::env::var("ARIA_SYSTEM_PROMPT") {
            if !v.trim().is_empty() {
                config.system_prompt = v;
            }
        }
        Ok(config)
    }
}
