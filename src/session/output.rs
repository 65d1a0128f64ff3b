//! The output channel: a live, user-visible record of one turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Lifecycle status of an output message or one of its entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MsgStatus {
    #[default]
    Progress,
    Success,
    Error,
}

impl std::fmt::Display for MsgStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MsgStatus::Progress => write!(f, "progress"),
            MsgStatus::Success => write!(f, "success"),
            MsgStatus::Error => write!(f, "error"),
        }
    }
}

/// Payload of an output entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBody {
    Text { text: String },
    Image { url: Option<String> },
    Audio { url: Option<String> },
}

/// One user-visible piece of content produced during a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputContent {
    /// Agent that produced the entry ("assistant" for the engine itself).
    pub agent_name: String,
    pub status: MsgStatus,
    pub status_message: String,
    #[serde(flatten)]
    pub body: ContentBody,
}

impl OutputContent {
    /// A text entry in progress.
    pub fn text(agent_name: &str, status_message: &str) -> Self {
        Self::with_body(agent_name, status_message, ContentBody::Text { text: String::new() })
    }

    pub fn image(agent_name: &str, status_message: &str) -> Self {
        Self::with_body(agent_name, status_message, ContentBody::Image { url: None })
    }

    pub fn audio(agent_name: &str, status_message: &str) -> Self {
        Self::with_body(agent_name, status_message, ContentBody::Audio { url: None })
    }

    fn with_body(agent_name: &str, status_message: &str, body: ContentBody) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            status: MsgStatus::Progress,
            status_message: status_message.to_string(),
            body,
        }
    }

    /// Mark the entry finished.
    pub fn finish(&mut self, status: MsgStatus, status_message: &str) {
        self.status = status;
        self.status_message = status_message.to_string();
    }

    /// Text payload, if this is a text entry.
    pub fn text_body(&self) -> Option<&str> {
        match &self.body {
            ContentBody::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Live transcript for one turn.
///
/// Both the reasoning engine and invoked capabilities append to it. Every
/// `push_update` and `publish` sends a snapshot to the subscriber, if any.
/// Clones are detached snapshots: they never carry the subscriber.
#[derive(Debug, Serialize, Deserialize)]
pub struct OutputMessage {
    pub msg_id: String,
    pub session_id: String,
    pub conv_id: String,
    pub actions: Vec<String>,
    pub agents: Vec<String>,
    pub content: Vec<OutputContent>,
    pub status: MsgStatus,
    #[serde(default)]
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    subscriber: Option<mpsc::UnboundedSender<OutputMessage>>,
}

impl Clone for OutputMessage {
    fn clone(&self) -> Self {
        Self {
            msg_id: self.msg_id.clone(),
            session_id: self.session_id.clone(),
            conv_id: self.conv_id.clone(),
            actions: self.actions.clone(),
            agents: self.agents.clone(),
            content: self.content.clone(),
            status: self.status,
            published: self.published,
            created_at: self.created_at,
            updated_at: self.updated_at,
            subscriber: None,
        }
    }
}

impl OutputMessage {
    /// Create a fresh output message for a new turn.
    pub fn new(session_id: &str, conv_id: &str) -> Self {
        let now = Utc::now();
        Self {
            msg_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            conv_id: conv_id.to_string(),
            actions: Vec::new(),
            agents: Vec::new(),
            content: Vec::new(),
            status: MsgStatus::Progress,
            published: false,
            created_at: now,
            updated_at: now,
            subscriber: None,
        }
    }

    /// Receive a snapshot every time the message is updated or published.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<OutputMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriber = Some(tx);
        rx
    }

    /// Send snapshots to an existing channel.
    pub fn attach(&mut self, tx: mpsc::UnboundedSender<OutputMessage>) {
        self.subscriber = Some(tx);
    }

    /// Stop sending snapshots; the receiver sees the channel close once other clones are gone.
    pub fn detach(&mut self) {
        self.subscriber = None;
    }

    /// Append a content entry and return its index for later updates.
    pub fn push_content(&mut self, content: OutputContent) -> usize {
        self.content.push(content);
        self.content.len() - 1
    }

    /// Flush the current partial state to the subscriber.
    pub fn push_update(&mut self) {
        self.updated_at = Utc::now();
        self.notify();
    }

    /// Mark the message final for this turn.
    pub fn publish(&mut self) {
        self.published = true;
        self.push_update();
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    /// Text of the last text entry written by the engine itself.
    pub fn final_text(&self) -> Option<&str> {
        self.content
            .iter()
            .rev()
            .find(|c| c.agent_name == "assistant")
            .and_then(|c| c.text_body())
    }

    fn notify(&mut self) {
        let Some(tx) = &self.subscriber else {
            return;
        };
        if tx.send(self.clone()).is_err() {
            // Receiver went away; stop sending.
            self.subscriber = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_notifies_subscriber() {
        let mut output = OutputMessage::new("s1", "c1");
        let mut rx = output.subscribe();

        output.actions.push("Reasoning the message..".to_string());
        output.push_update();
        output.status = MsgStatus::Success;
        output.publish();

        let first = rx.try_recv().unwrap();
        assert_eq!(first.actions.len(), 1);
        assert!(!first.published);

        let second = rx.try_recv().unwrap();
        assert!(second.published);
        assert_eq!(second.status, MsgStatus::Success);
    }

    #[test]
    fn test_clone_does_not_keep_channel_open() {
        let mut output = OutputMessage::new("s1", "c1");
        let mut rx = output.subscribe();
        let stored = output.clone();

        output.detach();
        drop(output);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(stored.session_id, "s1");
    }

    #[test]
    fn test_dropped_receiver_is_ignored() {
        let mut output = OutputMessage::new("s1", "c1");
        drop(output.subscribe());
        output.push_update();
        output.publish();
        assert!(output.is_published());
    }

    #[test]
    fn test_content_serializes_with_type_tag() {
        let mut entry = OutputContent::image("image_generation", "Generating...");
        entry.body = ContentBody::Image {
            url: Some("file:///tmp/a.png".to_string()),
        };
        entry.finish(MsgStatus::Success, "Image generated");

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "image");
        assert_eq!(value["status"], "success");
        assert_eq!(value["url"], "file:///tmp/a.png");
    }

    #[test]
    fn test_final_text_reads_assistant_entry() {
        let mut output = OutputMessage::new("s1", "c1");
        output.push_content(OutputContent::text("audio_generation", "Working"));
        let idx = output.push_content(OutputContent::text("assistant", "Consolidating outcomes..."));
        output.content[idx].body = ContentBody::Text {
            text: "All done".to_string(),
        };
        assert_eq!(output.final_text(), Some("All done"));
    }
}
