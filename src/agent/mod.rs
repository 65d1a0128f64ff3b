//! Capabilities ("agents") the reasoning engine can invoke.
//!
//! Each capability exposes a unique name, a description and a JSON-schema
//! parameter contract that is handed to the LLM verbatim. The engine only ever
//! calls [`Capability::safe_call`], which turns every failure into an
//! [`AgentResponse`] with an error status.

mod capabilities;
mod generators;
mod registry;

pub use capabilities::{
    AudioGenerationCapability, ImageGenerationCapability, MediaLibraryCapability,
    StoryboardingCapability,
};
pub use generators::{ImageGenerator, OpenAiImageGenerator, OpenAiSpeechGenerator, SpeechGenerator};
pub use registry::CapabilityRegistry;

use crate::config::Settings;
use crate::error::Result;
use crate::library::MediaLibrary;
use crate::llm::ToolDescriptor;
use crate::session::OutputMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Message returned when a capability is invoked after the user cancelled.
pub const CANCELED_MESSAGE: &str = "Generation canceled by user.";

/// Status of a capability invocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    Error,
}

/// Uniform result of any capability invocation.
///
/// The engine only inspects `status`; `message` and `data` are folded into
/// the conversation as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResponse {
    pub status: AgentStatus,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl AgentResponse {
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: AgentStatus::Success,
            message: message.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AgentStatus::Error,
            message: message.into(),
            data: Value::Null,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == AgentStatus::Error
    }
}

impl std::fmt::Display for AgentResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "{{\"status\":\"{:?}\",\"message\":{:?}}}", self.status, self.message),
        }
    }
}

/// What a capability gets to work with during one invocation.
pub struct AgentContext<'a> {
    /// Live transcript of the current turn; capabilities append progress entries.
    pub output: &'a mut OutputMessage,
    pub session_id: String,
    pub collection_id: Option<String>,
    pub video_id: Option<String>,
    stop: CancellationToken,
}

impl<'a> AgentContext<'a> {
    pub fn new(
        output: &'a mut OutputMessage,
        session_id: impl Into<String>,
        collection_id: Option<String>,
        video_id: Option<String>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            output,
            session_id: session_id.into(),
            collection_id,
            video_id,
            stop,
        }
    }

    /// Whether the run has been asked to stop.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Report that the user asked to cancel; the engine stops after this call returns.
    pub fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Token for sub-tasks that need to poll for cancellation.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }
}

/// A named, schema-described unit of work the LLM can invoke.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name; the LLM selects the capability by it.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments.
    fn parameters(&self) -> Value;

    /// Do the work. Errors are converted by [`Capability::safe_call`].
    async fn run(&self, args: Map<String, Value>, ctx: &mut AgentContext<'_>) -> Result<AgentResponse>;

    /// Guarded entry point: never fails, and refuses to start once the run is stopped.
    async fn safe_call(&self, args: Map<String, Value>, ctx: &mut AgentContext<'_>) -> AgentResponse {
        if ctx.is_stopped() {
            return AgentResponse::error(CANCELED_MESSAGE);
        }
        match self.run(args, ctx).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Capability {} failed: {}", self.name(), e);
                AgentResponse::error(e.to_string())
            }
        }
    }

    /// Descriptor handed to the LLM.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Parse raw tool arguments into a capability's typed argument struct.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(
    capability: &str,
    args: Map<String, Value>,
) -> Result<T> {
    serde_json::from_value(Value::Object(args)).map_err(|e| {
        crate::error::MontageError::InvalidInput(format!("Invalid arguments for {}: {}", capability, e))
    })
}

/// Build the registry of built-in capabilities from settings.
pub fn builtin_registry(settings: &Settings, library: Arc<dyn MediaLibrary>) -> Result<CapabilityRegistry> {
    let media_dir = settings.media_dir();
    let images: Arc<dyn ImageGenerator> = Arc::new(OpenAiImageGenerator::new(&settings.media, &media_dir)?);
    let speech: Arc<dyn SpeechGenerator> = Arc::new(OpenAiSpeechGenerator::new(&settings.media, &media_dir)?);

    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(MediaLibraryCapability::new(library)))?;
    registry.register(Arc::new(ImageGenerationCapability::new(images.clone())))?;
    registry.register(Arc::new(AudioGenerationCapability::new(speech)))?;
    registry.register(Arc::new(StoryboardingCapability::new(
        images,
        settings.media.max_concurrent,
    )))?;
    Ok(registry)
}
