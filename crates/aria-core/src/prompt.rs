//! Prompt construction: system instruction + dated memory snippets + recent
//! context + the new utterance.

use crate::types::{ChatMessage, MemoryHit, Role};

/// System instruction used when the host supplies none. Replies are read
/// aloud, so the model is steered toward short conversational answers.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant in an ongoing spoken \
conversation. Keep replies concise and conversational; they will be read aloud to the user.";

/// Build the message list for one turn. Retrieved memories are appended to the
/// system message as dated quoted snippets; recent context follows in order;
/// the new utterance is the last user message.
pub fn build_messages(
    system_prompt: &str,
    memories: &[MemoryHit],
    recent: &[ChatMessage],
    utterance: &str,
) -> Vec<ChatMessage> {
    let mut system = system_prompt.trim().to_string();
    if !memories.is_empty() {
        system.push_str("\n\nRelevant things the user said in earlier conversations:");
        for hit in memories {
            system.push_str(&format!(
                "\n- On {}, they said: \"{}\"",
                hit.timestamp.format("%Y-%m-%d"),
                hit.content.trim()
            ));
        }
    }

    let mut messages = Vec::with_capacity(recent.len() + 2);
    messages.push(ChatMessage::new(Role::System, system));
    messages.extend(recent.iter().cloned());
    messages.push(ChatMessage::new(Role::User, utterance));
    messages
}
