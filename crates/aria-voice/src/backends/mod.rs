//! Shipped collaborator implementations.
//!
//! Each backend has a remote implementation speaking an OpenAI-compatible
//! HTTP API and a placeholder that works offline, so the pipeline runs end to
//! end without credentials.

pub mod generation;
pub mod synthesis;
pub mod transcription;

use aria_core::{AriaError, AriaResult};

/// First non-empty value among `keys`, as remote backends resolve credentials.
pub(crate) fn env_any(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|value| !value.trim().is_empty())
}

pub(crate) fn require_key(keys: &[&str], what: &str) -> AriaResult<String> {
    env_any(keys).ok_or_else(|| {
        AriaError::Config(format!(
            "{} needs an API key; set one of: {}",
            what,
            keys.join(", ")
        ))
    })
}
