//! Document-store abstraction for [`Conversation`] (SPEC_FULL.md's "Test
//! tooling" ambient section). Kept trait-only plus an in-memory fake here so
//! `chronicle-domain` stays redis-free; the real Redis-backed implementation
//! lives in `chronicle-worker`, which already depends on both crates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::conversation::Conversation;
use crate::error::Result;

/// Load/save a [`Conversation`] document by id. Implementations that read
/// from a raw store (Redis, a file) should go through
/// [`Conversation::from_legacy_json`] rather than `serde_json::from_str`
/// directly, so legacy-shaped documents are normalized before typed
/// deserialization runs.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>>;
    async fn save(&self, conversation: &Conversation) -> Result<()>;
}

/// In-memory fake, the `MemoryStore` test double SPEC_FULL.md's test
/// tooling section names.
#[derive(Default, Clone)]
pub struct MemoryConversationStore {
    documents: Arc<RwLock<HashMap<String, Conversation>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(self.documents.read().get(conversation_id).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        self.documents
            .write()
            .insert(conversation.conversation_id.clone(), conversation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryConversationStore::new();
        let conv = Conversation::new("user-1", "client-1");
        let id = conv.conversation_id.clone();
        store.save(&conv).await.unwrap();
        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.conversation_id, id);
        assert!(store.load("missing").await.unwrap().is_none());
    }
}
