//! Text-to-speech narration.

use super::file_url;
use crate::agent::{parse_args, AgentContext, AgentResponse, Capability, SpeechGenerator};
use crate::error::{MontageError, Result};
use crate::session::{ContentBody, MsgStatus, OutputContent};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

/// Longest text accepted by the speech API in one request.
const MAX_TEXT_CHARS: usize = 4096;

#[derive(Debug, Deserialize)]
struct AudioArgs {
    text: String,
    voice: Option<String>,
}

/// Generates narration audio from text.
pub struct AudioGenerationCapability {
    generator: Arc<dyn SpeechGenerator>,
}

impl AudioGenerationCapability {
    pub fn new(generator: Arc<dyn SpeechGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Capability for AudioGenerationCapability {
    fn name(&self) -> &str {
        "audio_generation"
    }

    fn description(&self) -> &str {
        "Generate spoken audio (voiceover, narration) from text."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Text to speak"
                },
                "voice": {
                    "type": "string",
                    "enum": ["alloy", "echo", "fable", "onyx", "nova", "shimmer"],
                    "description": "Voice to use. Defaults to the configured voice."
                }
            },
            "required": ["text"]
        })
    }

    async fn run(&self, args: Map<String, Value>, ctx: &mut AgentContext<'_>) -> Result<AgentResponse> {
        let args: AudioArgs = parse_args(self.name(), args)?;
        if args.text.trim().is_empty() {
            return Err(MontageError::InvalidInput("text must not be empty".to_string()));
        }
        if args.text.chars().count() > MAX_TEXT_CHARS {
            return Err(MontageError::InvalidInput(format!(
                "text is longer than {} characters",
                MAX_TEXT_CHARS
            )));
        }

        let idx = ctx
            .output
            .push_content(OutputContent::audio(self.name(), "Generating audio..."));
        ctx.output.push_update();

        match self.generator.synthesize(&args.text, args.voice.as_deref()).await {
            Ok(path) => {
                let url = file_url(&path);
                info!("Generated audio at {}", url);
                let entry = &mut ctx.output.content[idx];
                entry.body = ContentBody::Audio { url: Some(url.clone()) };
                entry.finish(MsgStatus::Success, "Here is your generated audio");
                ctx.output.push_update();
                Ok(AgentResponse::success(
                    "Audio generated and shown to the user",
                    json!({ "audio_url": url }),
                ))
            }
            Err(e) => {
                ctx.output.content[idx].finish(MsgStatus::Error, "Failed to generate audio");
                ctx.output.push_update();
                Ok(AgentResponse::error(format!("Audio generation failed: {}", e)))
            }
        }
    }
}
