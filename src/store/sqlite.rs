//! SQLite-based session store.

use super::SessionStore;
use crate::error::{MontageError, Result};
use crate::session::{ContextLog, ConversationMessage, SessionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    collection_id TEXT,
    video_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    msg_id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    conv_id TEXT NOT NULL,
    msg_type TEXT NOT NULL,
    status TEXT,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (session_id) REFERENCES sessions(session_id)
);

CREATE INDEX IF NOT EXISTS idx_conversations_session_id ON conversations(session_id);

CREATE TABLE IF NOT EXISTS context_messages (
    session_id TEXT PRIMARY KEY,
    context_json TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (session_id) REFERENCES sessions(session_id)
);
"#;

/// SQLite-based session store.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) a session store at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite session store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MontageError::SessionStore(format!("Failed to acquire lock: {}", e)))
    }
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let created_at: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(SessionRecord {
        session_id: row.get(0)?,
        collection_id: row.get(1)?,
        video_id: row.get(2)?,
        created_at: parse_time(&created_at),
        updated_at: parse_time(&updated_at),
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    #[instrument(skip(self, record), fields(session_id = %record.session_id))]
    async fn upsert_session(&self, record: &SessionRecord) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO sessions (session_id, collection_id, video_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(session_id) DO UPDATE SET
                collection_id = excluded.collection_id,
                video_id = excluded.video_id,
                updated_at = excluded.updated_at
            "#,
            params![
                record.session_id,
                record.collection_id,
                record.video_id,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;

        debug!("Upserted session");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.lock()?;

        let record = conn.query_row(
            r#"
            SELECT session_id, collection_id, video_id, created_at, updated_at
            FROM sessions WHERE session_id = ?1
            "#,
            params![session_id],
            row_to_record,
        );

        match record {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT session_id, collection_id, video_id, created_at, updated_at
            FROM sessions
            ORDER BY updated_at DESC
            "#,
        )?;

        let rows = stmt.query_map([], row_to_record)?;
        let result: Vec<SessionRecord> = rows.filter_map(|r| r.ok()).collect();
        Ok(result)
    }

    #[instrument(skip(self))]
    async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let conn = self.lock()?;

        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM conversations WHERE session_id = ?1", params![session_id])?;
        tx.execute("DELETE FROM context_messages WHERE session_id = ?1", params![session_id])?;
        let deleted = tx.execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id])?;
        tx.commit()?;

        info!("Deleted session {} ({} row)", session_id, deleted);
        Ok(deleted > 0)
    }

    #[instrument(skip(self, context), fields(messages = context.len()))]
    async fn save_context(&self, session_id: &str, context: &ContextLog) -> Result<()> {
        let context_json = serde_json::to_string(context)?;
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO context_messages (session_id, context_json, updated_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![session_id, context_json, Utc::now().to_rfc3339()],
        )?;

        debug!("Saved context for session {}", session_id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_context(&self, session_id: &str) -> Result<ContextLog> {
        let conn = self.lock()?;

        let result = conn.query_row(
            "SELECT context_json FROM context_messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(ContextLog::new()),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, message), fields(msg_id = %message.msg_id()))]
    async fn save_message(&self, session_id: &str, message: &ConversationMessage) -> Result<()> {
        let body = serde_json::to_string(message)?;
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO conversations
            (msg_id, session_id, conv_id, msg_type, status, body, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(msg_id) DO UPDATE SET
                status = excluded.status,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
            params![
                message.msg_id(),
                session_id,
                message.conv_id(),
                message.msg_type(),
                message.status().map(|s| s.to_string()),
                body,
                message.created_at().to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_messages(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT body FROM conversations
            WHERE session_id = ?1
            ORDER BY rowid
            "#,
        )?;

        let rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;

        let mut messages = Vec::new();
        for body in rows {
            messages.push(serde_json::from_str(&body?)?);
        }
        Ok(messages)
    }

    async fn health_check(&self) -> bool {
        match self.lock() {
            Ok(conn) => conn
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ContextMessage, InputMessage, MsgStatus, OutputMessage, Session};

    #[tokio::test]
    async fn test_session_roundtrip_and_delete() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let session = Session::new(Some("s1".to_string()), Some("c1".to_string()), None);

        store.upsert_session(&session.record()).await.unwrap();
        let loaded = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(loaded.collection_id.as_deref(), Some("c1"));

        let mut context = ContextLog::new();
        context.push(ContextMessage::system("orientation"));
        context.push(ContextMessage::user("hello"));
        store.save_context("s1", &context).await.unwrap();
        assert_eq!(store.load_context("s1").await.unwrap(), context);

        assert!(store.delete_session("s1").await.unwrap());
        assert!(store.get_session("s1").await.unwrap().is_none());
        assert!(store.load_context("s1").await.unwrap().is_empty());
        assert!(!store.delete_session("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_output_message_updates_in_place() {
        let store = SqliteSessionStore::in_memory().unwrap();
        let session = Session::new(Some("s1".to_string()), None, None);
        store.upsert_session(&session.record()).await.unwrap();

        let input = InputMessage::new("s1", "conv", "cut the intro", vec![]);
        store
            .save_message("s1", &ConversationMessage::Input(input))
            .await
            .unwrap();

        let mut output = OutputMessage::new("s1", "conv");
        store
            .save_message("s1", &ConversationMessage::Output(output.clone()))
            .await
            .unwrap();
        output.status = MsgStatus::Success;
        store
            .save_message("s1", &ConversationMessage::Output(output))
            .await
            .unwrap();

        let messages = store.list_messages("s1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].status(), Some(MsgStatus::Success));
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("sessions.db");

        {
            let store = SqliteSessionStore::new(&path).unwrap();
            let session = Session::new(Some("s1".to_string()), None, None);
            store.upsert_session(&session.record()).await.unwrap();
            assert!(store.health_check().await);
        }

        let reopened = SqliteSessionStore::new(&path).unwrap();
        assert_eq!(reopened.list_sessions().await.unwrap().len(), 1);
    }
}
