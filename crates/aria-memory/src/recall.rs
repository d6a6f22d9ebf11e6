//! Sled-backed conversation log with a hot cache and lexical recall.

use aria_core::{AriaError, AriaResult, ChatMessage, ConversationStore, MemoryHit, MemoryStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;
use tracing::debug;

const MESSAGE_PREFIX: &str = "msg";

fn conversation_prefix(conversation_id: &str) -> String {
    format!("{}/{}/", MESSAGE_PREFIX, conversation_id)
}

fn message_key(conversation_id: &str, seq: u64) -> String {
    // Zero-padded so lexicographic key order equals append order.
    format!("{}/{}/{:020}", MESSAGE_PREFIX, conversation_id, seq)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Local store for one user's conversation history.
///
/// Messages are kept in sled keyed by append order; a DashMap cache holds each
/// conversation's history so repeated context reads skip the scan. Recall is
/// lexical token overlap, ranked best-first with recency as the tiebreak.
pub struct RecallStore {
    db: sled::Db,
    owner: String,
    cache: DashMap<String, Vec<ChatMessage>>,
}

impl RecallStore {
    /// Open or create a store at `path` for the default owner.
    pub fn open<P: AsRef<Path>>(path: P) -> AriaResult<Self> {
        let db = sled::open(path).map_err(|e| AriaError::Persistence(e.to_string()))?;
        Ok(Self {
            db,
            owner: "default".to_string(),
            cache: DashMap::new(),
        })
    }

    /// Set the user this store belongs to. Searches for any other user come
    /// back empty.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    fn load_conversation(&self, conversation_id: &str) -> AriaResult<Vec<ChatMessage>> {
        if let Some(cached) = self.cache.get(conversation_id) {
            return Ok(cached.clone());
        }
        let mut messages = Vec::new();
        for entry in self.db.scan_prefix(conversation_prefix(conversation_id)) {
            let (_, value) = entry.map_err(|e| AriaError::Memory(e.to_string()))?;
            let message: ChatMessage =
                serde_json::from_slice(&value).map_err(|e| AriaError::Memory(e.to_string()))?;
            messages.push(message);
        }
        self.cache
            .insert(conversation_id.to_string(), messages.clone());
        Ok(messages)
    }

    fn append(&self, conversation_id: &str, message: &ChatMessage) -> AriaResult<()> {
        let seq = self
            .db
            .generate_id()
            .map_err(|e| AriaError::Persistence(e.to_string()))?;
        let key = message_key(conversation_id, seq);
        let value =
            serde_json::to_vec(message).map_err(|e| AriaError::Persistence(e.to_string()))?;
        self.db
            .insert(key.as_bytes(), value)
            .map_err(|e| AriaError::Persistence(e.to_string()))?;
        if let Some(mut cached) = self.cache.get_mut(conversation_id) {
            cached.push(message.clone());
        }
        Ok(())
    }

    fn scan_all(&self) -> AriaResult<Vec<ChatMessage>> {
        let mut messages = Vec::new();
        for entry in self.db.scan_prefix(format!("{}/", MESSAGE_PREFIX)) {
            let (_, value) = entry.map_err(|e| AriaError::Memory(e.to_string()))?;
            let message: ChatMessage =
                serde_json::from_slice(&value).map_err(|e| AriaError::Memory(e.to_string()))?;
            messages.push(message);
        }
        Ok(messages)
    }
}

#[async_trait]
impl ConversationStore for RecallStore {
    async fn append_message(&self, conversation_id: &str, message: &ChatMessage) -> AriaResult<()> {
        self.append(conversation_id, message)
    }
}

#[async_trait]
impl MemoryStore for RecallStore {
    async fn recent_context(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> AriaResult<Vec<ChatMessage>> {
        let messages = self.load_conversation(conversation_id)?;
        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    async fn search(&self, query: &str, user_id: &str, k: usize) -> AriaResult<Vec<MemoryHit>> {
        if user_id != self.owner {
            debug!(user_id, owner = %self.owner, "recall for unknown user, returning nothing");
            return Ok(Vec::new());
        }
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<MemoryHit> = Vec::new();
        for message in self.scan_all()? {
            let tokens = tokenize(&message.content);
            if tokens.is_empty() {
                continue;
            }
            let overlap = query_tokens.iter().filter(|t| tokens.contains(t)).count();
            if overlap == 0 {
                continue;
            }
            hits.push(MemoryHit {
                content: message.content,
                score: overlap as f32 / query_tokens.len() as f32,
                timestamp: message.timestamp,
            });
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aria_core::Role;

    fn store() -> (RecallStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = RecallStore::open(dir.path().join("recall")).expect("open");
        (store, dir)
    }

    #[tokio::test]
    async fn append_then_recent_keeps_order() {
        let (store, _dir) = store();
        for text in ["one", "two", "three"] {
            store
                .append_message("c1", &ChatMessage::new(Role::User, text))
                .await
                .unwrap();
        }
        let recent = store.recent_context("c1", 10).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn recent_respects_limit() {
        let (store, _dir) = store();
        for i in 0..5 {
            store
                .append_message("c1", &ChatMessage::new(Role::User, format!("m{}", i)))
                .await
                .unwrap();
        }
        let recent = store.recent_context("c1", 2).await.unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn cache_sees_appends_after_first_read() {
        let (store, _dir) = store();
        store
            .append_message("c1", &ChatMessage::new(Role::User, "first"))
            .await
            .unwrap();
        // Prime the cache, then append more.
        assert_eq!(store.recent_context("c1", 10).await.unwrap().len(), 1);
        store
            .append_message("c1", &ChatMessage::new(Role::Assistant, "second"))
            .await
            .unwrap();
        assert_eq!(store.recent_context("c1", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let (store, _dir) = store();
        store
            .append_message("c1", &ChatMessage::new(Role::User, "alpha"))
            .await
            .unwrap();
        store
            .append_message("c2", &ChatMessage::new(Role::User, "beta"))
            .await
            .unwrap();
        let recent = store.recent_context("c2", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "beta");
    }

    #[tokio::test]
    async fn search_ranks_by_overlap_and_caps_at_k() {
        let (store, _dir) = store();
        for text in [
            "I moved to Berlin last spring",
            "my favourite color is green",
            "Berlin winters are cold",
            "I like green tea from Berlin",
        ] {
            store
                .append_message("c1", &ChatMessage::new(Role::User, text))
                .await
                .unwrap();
        }
        let hits = store.search("green tea", "default", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "I like green tea from Berlin");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn search_for_other_user_is_empty() {
        let (store, _dir) = store();
        store
            .append_message("c1", &ChatMessage::new(Role::User, "private fact"))
            .await
            .unwrap();
        let hits = store.search("private", "someone-else", 3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn messages_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("recall");
        {
            let store = RecallStore::open(&path).expect("open");
            store
                .append_message("c1", &ChatMessage::new(Role::User, "durable"))
                .await
                .unwrap();
        }
        let store = RecallStore::open(&path).expect("reopen");
        let recent = store.recent_context("c1", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "durable");
    }
}
