//! Sessions: the durable unit of conversation.
//!
//! A session owns the conversation context shared across turns and the
//! output message of the turn in progress.

mod context;
mod output;

pub use context::{ContextLog, ContextMessage, Role, ToolCall, ToolInvocation};
pub use output::{ContentBody, MsgStatus, OutputContent, OutputMessage};

use crate::library::{Collection, Video};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted metadata of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub collection_id: Option<String>,
    pub video_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Library data resolved for the session before a turn runs.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub collection: Option<Collection>,
    pub video: Option<Video>,
}

/// A user message that starts a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputMessage {
    pub msg_id: String,
    pub session_id: String,
    pub conv_id: String,
    pub content: String,
    /// Restrict the turn to these capabilities; empty means all.
    #[serde(default)]
    pub agents: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl InputMessage {
    pub fn new(session_id: &str, conv_id: &str, content: &str, agents: Vec<String>) -> Self {
        Self {
            msg_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            conv_id: conv_id.to_string(),
            content: content.to_string(),
            agents,
            created_at: Utc::now(),
        }
    }
}

/// A stored conversation entry: the user's input or the turn's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum ConversationMessage {
    Input(InputMessage),
    Output(OutputMessage),
}

impl ConversationMessage {
    pub fn msg_id(&self) -> &str {
        match self {
            ConversationMessage::Input(m) => &m.msg_id,
            ConversationMessage::Output(m) => &m.msg_id,
        }
    }

    pub fn conv_id(&self) -> &str {
        match self {
            ConversationMessage::Input(m) => &m.conv_id,
            ConversationMessage::Output(m) => &m.conv_id,
        }
    }

    pub fn msg_type(&self) -> &'static str {
        match self {
            ConversationMessage::Input(_) => "input",
            ConversationMessage::Output(_) => "output",
        }
    }

    pub fn status(&self) -> Option<MsgStatus> {
        match self {
            ConversationMessage::Input(_) => None,
            ConversationMessage::Output(m) => Some(m.status),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            ConversationMessage::Input(m) => m.created_at,
            ConversationMessage::Output(m) => m.created_at,
        }
    }
}

/// A conversation with its context log and current output message.
#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub collection_id: Option<String>,
    pub video_id: Option<String>,
    pub reasoning_context: ContextLog,
    pub output_message: OutputMessage,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session. A missing id is generated.
    pub fn new(session_id: Option<String>, collection_id: Option<String>, video_id: Option<String>) -> Self {
        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let output_message = OutputMessage::new(&session_id, &Uuid::new_v4().to_string());
        Self {
            session_id,
            collection_id,
            video_id,
            reasoning_context: ContextLog::new(),
            output_message,
            state: SessionState::default(),
            created_at: Utc::now(),
        }
    }

    /// Restore a session from its stored record and context.
    pub fn from_record(record: SessionRecord, context: ContextLog) -> Self {
        let output_message = OutputMessage::new(&record.session_id, &Uuid::new_v4().to_string());
        Self {
            session_id: record.session_id,
            collection_id: record.collection_id,
            video_id: record.video_id,
            reasoning_context: context,
            output_message,
            state: SessionState::default(),
            created_at: record.created_at,
        }
    }

    /// Start a new turn with a fresh output message; returns the turn's conversation id.
    pub fn start_turn(&mut self) -> String {
        let conv_id = Uuid::new_v4().to_string();
        self.output_message = OutputMessage::new(&self.session_id, &conv_id);
        conv_id
    }

    /// Metadata to persist.
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            session_id: self.session_id.clone(),
            collection_id: self.collection_id.clone(),
            video_id: self.video_id.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}
