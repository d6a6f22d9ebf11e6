//! # Aria Memory — local conversation log and recall
//!
//! Sled-backed storage of per-conversation message history with a DashMap hot
//! cache, plus lexical top-K recall over prior messages. Implements the
//! pipeline's `ConversationStore` and `MemoryStore` collaborator contracts.

pub mod recall;

pub use recall::RecallStore;
