//! Session persistence.
//!
//! Provides a trait-based interface for storing sessions, their context logs
//! and their conversation history.

mod memory;
mod sqlite;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

use crate::config::Settings;
use crate::error::{MontageError, Result};
use crate::session::{ContextLog, ConversationMessage, SessionRecord};
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for session store implementations.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or update session metadata.
    async fn upsert_session(&self, record: &SessionRecord) -> Result<()>;

    /// Get a session's metadata.
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// List all sessions, most recently updated first.
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>>;

    /// Delete a session with its context and conversation. Returns false if it did not exist.
    async fn delete_session(&self, session_id: &str) -> Result<bool>;

    /// Replace the stored context log of a session.
    async fn save_context(&self, session_id: &str, context: &ContextLog) -> Result<()>;

    /// Load a session's context log (empty if none was stored).
    async fn load_context(&self, session_id: &str) -> Result<ContextLog>;

    /// Insert or update a conversation message.
    async fn save_message(&self, session_id: &str, message: &ConversationMessage) -> Result<()>;

    /// Conversation history of a session in creation order.
    async fn list_messages(&self, session_id: &str) -> Result<Vec<ConversationMessage>>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> bool;
}

/// Open the store configured in settings.
pub fn open_store(settings: &Settings) -> Result<Arc<dyn SessionStore>> {
    match settings.session_store.provider.as_str() {
        "sqlite" => Ok(Arc::new(SqliteSessionStore::new(&settings.sqlite_path())?)),
        "memory" => Ok(Arc::new(MemorySessionStore::new())),
        other => Err(MontageError::Config(format!(
            "Unknown session store provider: {}",
            other
        ))),
    }
}
