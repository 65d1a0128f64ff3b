//! LLM gateway: the stateless request/response boundary to the reasoning model.
//!
//! The gateway accepts the full message history, the descriptors of the
//! capabilities the model may call and an optional output constraint, and
//! returns text and/or a list of requested tool invocations.

mod openai;

pub use openai::OpenAiGateway;

use crate::config::LlmSettings;
use crate::error::{MontageError, Result};
use crate::session::{ContextMessage, ToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Tool descriptor handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments, passed to the model verbatim.
    pub parameters: Value,
}

/// Structured-output constraint for a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of the turn.
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Map a provider's finish reason string. `end_turn` is treated as a natural stop.
    pub fn from_provider(reason: &str) -> Self {
        match reason {
            "stop" | "end_turn" => FinishReason::Stop,
            "length" | "max_tokens" => FinishReason::Length,
            "tool_calls" | "tool_use" | "function_call" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }

    /// Whether the model considers the turn finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FinishReason::Stop)
    }
}

/// Outcome of a gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmStatus {
    Success,
    Error,
}

/// Response from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub status: LlmStatus,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl LlmResponse {
    /// A successful plain-text response that ends the turn.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            status: LlmStatus::Success,
            content: content.into(),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        }
    }

    /// A successful response requesting tool invocations.
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            finish_reason: FinishReason::ToolCalls,
            ..Self::text(content)
        }
    }

    /// A failed response; the content carries the error description.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: LlmStatus::Error,
            finish_reason: FinishReason::Other("error".to_string()),
            ..Self::text(message)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == LlmStatus::Success
    }
}

/// Trait for reasoning model gateways.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Run one chat completion over the given history.
    ///
    /// An empty `tools` slice means the model cannot call any capability.
    async fn chat_completions(
        &self,
        messages: &[ContextMessage],
        tools: &[ToolDescriptor],
        response_format: Option<ResponseFormat>,
    ) -> Result<LlmResponse>;

    /// Model identifier, for display.
    fn model_name(&self) -> &str;
}

/// Create the gateway configured in settings.
pub fn create_gateway(settings: &LlmSettings) -> Result<Arc<dyn LlmGateway>> {
    match settings.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiGateway::new(settings)?)),
        other => Err(MontageError::Config(format!("Unknown LLM provider: {}", other))),
    }
}
