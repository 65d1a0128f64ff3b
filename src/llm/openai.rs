//! OpenAI chat completions gateway.

use super::{FinishReason, LlmGateway, LlmResponse, LlmStatus, ResponseFormat, ToolDescriptor};
use crate::config::LlmSettings;
use crate::error::{MontageError, Result};
use crate::openai::{create_client_with, map_error};
use crate::session::{ContextMessage, Role, ToolCall};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs, ChatCompletionTool,
    ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs,
    FinishReason as OpenAiFinishReason, FunctionCall, FunctionObject,
    ResponseFormat as OpenAiResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, instrument};

/// Gateway backed by the OpenAI chat completions API.
pub struct OpenAiGateway {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    top_p: f32,
}

impl OpenAiGateway {
    /// Create a gateway from LLM settings.
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let client = create_client_with(
            settings.api_base.as_deref(),
            Duration::from_secs(settings.timeout_secs),
        )?;
        Ok(Self {
            client,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            top_p: settings.top_p,
        })
    }

    fn build_request(
        &self,
        messages: &[ContextMessage],
        tools: &[ToolDescriptor],
        response_format: Option<ResponseFormat>,
    ) -> Result<CreateChatCompletionRequest> {
        let request_messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(request_messages)
            .max_completion_tokens(self.max_tokens)
            .top_p(self.top_p);

        if !tools.is_empty() {
            args.tools(tools.iter().map(to_openai_tool).collect::<Vec<_>>())
                .tool_choice(ChatCompletionToolChoiceOption::Auto);
        }

        match response_format {
            Some(ResponseFormat::JsonObject) => {
                args.response_format(OpenAiResponseFormat::JsonObject);
            }
            Some(ResponseFormat::Text) => {
                args.response_format(OpenAiResponseFormat::Text);
            }
            None => {}
        }

        args.build().map_err(build_error)
    }
}

fn build_error(e: impl std::fmt::Display) -> MontageError {
    MontageError::Llm(format!("Failed to build request: {}", e))
}

fn to_request_message(message: &ContextMessage) -> Result<ChatCompletionRequestMessage> {
    let request = match message.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(build_error)?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(build_error)?
            .into(),
        Role::Assistant => {
            let mut args = ChatCompletionRequestAssistantMessageArgs::default();
            if !message.content.is_empty() || message.tool_calls.is_empty() {
                args.content(message.content.clone());
            }
            if !message.tool_calls.is_empty() {
                let calls = message
                    .tool_calls
                    .iter()
                    .map(to_openai_tool_call)
                    .collect::<Result<Vec<_>>>()?;
                args.tool_calls(calls);
            }
            args.build().map_err(build_error)?.into()
        }
        Role::Tool => {
            let tool_call_id = message.tool_call_id.clone().ok_or_else(|| {
                MontageError::Llm("Tool message without a tool_call_id".to_string())
            })?;
            ChatCompletionRequestToolMessageArgs::default()
                .tool_call_id(tool_call_id)
                .content(message.content.clone())
                .build()
                .map_err(build_error)?
                .into()
        }
    };
    Ok(request)
}

fn to_openai_tool_call(call: &ToolCall) -> Result<ChatCompletionMessageToolCall> {
    Ok(ChatCompletionMessageToolCall {
        id: call.id.clone(),
        r#type: ChatCompletionToolType::Function,
        function: FunctionCall {
            name: call.tool.name.clone(),
            arguments: serde_json::to_string(&call.tool.arguments)?,
        },
    })
}

fn from_openai_tool_call(call: &ChatCompletionMessageToolCall) -> Result<ToolCall> {
    let raw = call.function.arguments.trim();
    let arguments = if raw.is_empty() {
        Map::new()
    } else {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(MontageError::Llm(format!(
                    "Arguments for {} are not an object: {}",
                    call.function.name, other
                )))
            }
            Err(e) => {
                return Err(MontageError::Llm(format!(
                    "Malformed arguments for {}: {}",
                    call.function.name, e
                )))
            }
        }
    };
    Ok(ToolCall::new(call.id.clone(), call.function.name.clone(), arguments))
}

fn to_openai_tool(descriptor: &ToolDescriptor) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: descriptor.name.clone(),
            description: Some(descriptor.description.clone()),
            parameters: Some(descriptor.parameters.clone()),
            strict: None,
        },
    }
}

fn map_finish_reason(reason: Option<&OpenAiFinishReason>) -> FinishReason {
    match reason {
        Some(OpenAiFinishReason::Stop) => FinishReason::Stop,
        Some(OpenAiFinishReason::Length) => FinishReason::Length,
        Some(OpenAiFinishReason::ToolCalls) | Some(OpenAiFinishReason::FunctionCall) => {
            FinishReason::ToolCalls
        }
        Some(OpenAiFinishReason::ContentFilter) => FinishReason::ContentFilter,
        None => FinishReason::Other("unknown".to_string()),
    }
}

#[async_trait]
impl LlmGateway for OpenAiGateway {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len(), tools = tools.len()))]
    async fn chat_completions(
        &self,
        messages: &[ContextMessage],
        tools: &[ToolDescriptor],
        response_format: Option<ResponseFormat>,
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, tools, response_format)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| map_error("Chat completion failed", e))?;

        let choice = response
            .choices
            .first()
            .ok_or_else(|| MontageError::Llm("No response from model".to_string()))?;

        let tool_calls = match &choice.message.tool_calls {
            Some(calls) => calls
                .iter()
                .map(from_openai_tool_call)
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let (prompt_tokens, completion_tokens, total_tokens) = response
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens, u.completion_tokens, u.total_tokens))
            .unwrap_or_default();

        let finish_reason = map_finish_reason(choice.finish_reason.as_ref());
        debug!(
            "Completion finished with {:?}, {} tool call(s), {} tokens",
            finish_reason,
            tool_calls.len(),
            total_tokens
        );

        Ok(LlmResponse {
            status: LlmStatus::Success,
            content: choice.message.content.clone().unwrap_or_default(),
            tool_calls,
            finish_reason,
            prompt_tokens,
            completion_tokens,
            total_tokens,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_arguments_roundtrip_through_openai_shape() {
        let mut args = Map::new();
        args.insert("prompt".to_string(), json!("sunset"));
        args.insert("duration".to_string(), json!(5));
        let call = ToolCall::new("call_1", "video_generation", args.clone());

        let openai_call = to_openai_tool_call(&call).unwrap();
        assert_eq!(openai_call.function.name, "video_generation");

        let parsed = from_openai_tool_call(&openai_call).unwrap();
        assert_eq!(parsed.tool.arguments, args);
        assert_eq!(parsed.id, "call_1");
    }

    #[test]
    fn test_malformed_arguments_are_rejected() {
        let call = ChatCompletionMessageToolCall {
            id: "call_1".to_string(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: "media_library".to_string(),
                arguments: "{not json".to_string(),
            },
        };
        assert!(matches!(from_openai_tool_call(&call), Err(MontageError::Llm(_))));
    }

    #[test]
    fn test_empty_arguments_become_empty_map() {
        let call = ChatCompletionMessageToolCall {
            id: "call_1".to_string(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: "media_library".to_string(),
                arguments: String::new(),
            },
        };
        assert!(from_openai_tool_call(&call).unwrap().tool.arguments.is_empty());
    }

    #[test]
    fn test_tool_message_requires_call_id() {
        let mut message = ContextMessage::tool("ok", "call_1");
        assert!(to_request_message(&message).is_ok());
        message.tool_call_id = None;
        assert!(to_request_message(&message).is_err());
    }

    fn gateway() -> OpenAiGateway {
        OpenAiGateway {
            client: Client::with_config(OpenAIConfig::new().with_api_key("sk-test")),
            model: "gpt-4o".to_string(),
            max_tokens: 512,
            top_p: 1.0,
        }
    }

    #[test]
    fn test_json_object_format_reaches_request() {
        let messages = vec![ContextMessage::user("list the shots as JSON")];

        let request = gateway()
            .build_request(&messages, &[], Some(ResponseFormat::JsonObject))
            .unwrap();
        assert!(matches!(request.response_format, Some(OpenAiResponseFormat::JsonObject)));
        assert!(request.tools.is_none());

        let request = gateway().build_request(&messages, &[], None).unwrap();
        assert!(request.response_format.is_none());
    }

    #[test]
    fn test_tools_enable_auto_choice() {
        let tools = vec![ToolDescriptor {
            name: "media_library".to_string(),
            description: "Look up videos".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }];

        let request = gateway()
            .build_request(&[ContextMessage::user("what do I have?")], &tools, None)
            .unwrap();
        assert_eq!(request.tools.map(|t| t.len()), Some(1));
        assert!(matches!(request.tool_choice, Some(ChatCompletionToolChoiceOption::Auto)));
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(map_finish_reason(Some(&OpenAiFinishReason::Stop)), FinishReason::Stop);
        assert_eq!(
            map_finish_reason(Some(&OpenAiFinishReason::ToolCalls)),
            FinishReason::ToolCalls
        );
        assert!(matches!(map_finish_reason(None), FinishReason::Other(_)));
    }
}
