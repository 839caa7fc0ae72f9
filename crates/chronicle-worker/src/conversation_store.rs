//! Redis-backed [`ConversationStore`] (SPEC_FULL.md's claimed document-store
//! adapter). Lives here rather than in `chronicle-domain` since that crate
//! stays redis-free; `chronicle-worker` already depends on both.

use async_trait::async_trait;
use chronicle_domain::{Conversation, ConversationStore, Error, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

fn document_key(conversation_id: &str) -> String {
    format!("conversation:doc:{conversation_id}")
}

pub struct RedisConversationStore {
    conn: ConnectionManager,
}

impl RedisConversationStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(document_key(conversation_id))
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        raw.map(|s| Conversation::from_legacy_json(&s)).transpose()
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(conversation)?;
        let _: () = conn
            .set(document_key(&conversation.conversation_id), raw)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }
}
