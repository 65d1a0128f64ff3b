//! Conversation context: the role-tagged message log the reasoning engine feeds to the LLM.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a context message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Name and arguments of a requested capability invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// An LLM-requested capability invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Opaque correlation token echoed back on the tool message.
    pub id: String,
    pub tool: ToolInvocation,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Create a function tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            tool: ToolInvocation {
                name: name.into(),
                arguments,
            },
            call_type: default_call_type(),
        }
    }

    /// Name of the capability this call targets.
    pub fn name(&self) -> &str {
        &self.tool.name
    }
}

/// One role-tagged entry in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Present only on assistant messages requesting invocations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Present only on tool messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ContextMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant turn that requests tool invocations.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Result of one tool call, correlated by id.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Append-only conversation log.
///
/// Messages can be pushed and read but never edited, removed or reordered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ContextLog {
    messages: Vec<ContextMessage>,
}

impl ContextLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted messages.
    pub fn from_messages(messages: Vec<ContextMessage>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: ContextMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ContextMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ContextMessage> {
        self.messages.last()
    }

    /// Messages of the current turn: from the most recent user message to the end.
    ///
    /// Empty when the log holds no user message.
    pub fn current_run(&self) -> &[ContextMessage] {
        match self.messages.iter().rposition(|m| m.role == Role::User) {
            Some(start) => &self.messages[start..],
            None => &[],
        }
    }

    /// Check that every tool message answers a call made by an earlier assistant message.
    pub fn tool_results_are_correlated(&self) -> bool {
        let mut requested = std::collections::HashSet::new();
        for message in &self.messages {
            match message.role {
                Role::Assistant => {
                    requested.extend(message.tool_calls.iter().map(|c| c.id.as_str()));
                }
                Role::Tool => match message.tool_call_id.as_deref() {
                    Some(id) if requested.contains(id) => {}
                    _ => return false,
                },
                _ => {}
            }
        }
        true
    }
}
