//! Storage for summarized conversations.

pub mod conversation_store;

pub use conversation_store::{
    ConversationRecord, ConversationStore, InMemoryConversationStore, StoreError, StoreFuture,
    StoreResult,
};
