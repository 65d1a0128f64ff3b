//! In-memory session store.
//!
//! Useful for testing and throwaway sessions.

use super::SessionStore;
use crate::error::Result;
use crate::session::{ContextLog, ConversationMessage, SessionRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionRecord>,
    contexts: HashMap<String, ContextLog>,
    conversations: HashMap<String, Vec<ConversationMessage>>,
}

/// In-memory session store.
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
}

impl MemorySessionStore {
    /// Create a new in-memory session store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn upsert_session(&self, record: &SessionRecord) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        match inner.sessions.get_mut(&record.session_id) {
            Some(existing) => {
                existing.collection_id = record.collection_id.clone();
                existing.video_id = record.video_id.clone();
                existing.updated_at = record.updated_at;
            }
            None => {
                inner.sessions.insert(record.session_id.clone(), record.clone());
            }
        }
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.sessions.get(session_id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let inner = self.inner.read().unwrap();
        let mut sessions: Vec<SessionRecord> = inner.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        inner.contexts.remove(session_id);
        inner.conversations.remove(session_id);
        Ok(inner.sessions.remove(session_id).is_some())
    }

    async fn save_context(&self, session_id: &str, context: &ContextLog) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.contexts.insert(session_id.to_string(), context.clone());
        Ok(())
    }

    async fn load_context(&self, session_id: &str) -> Result<ContextLog> {
        let inner = self.inner.read().unwrap();
        Ok(inner.contexts.get(session_id).cloned().unwrap_or_default())
    }

    async fn save_message(&self, session_id: &str, message: &ConversationMessage) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        let messages = inner.conversations.entry(session_id.to_string()).or_default();
        match messages.iter_mut().find(|m| m.msg_id() == message.msg_id()) {
            Some(existing) => *existing = message.clone(),
            None => messages.push(message.clone()),
        }
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.conversations.get(session_id).cloned().unwrap_or_default())
    }

    async fn health_check(&self) -> bool {
        true
    }
}
