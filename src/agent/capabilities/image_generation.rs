//! Text-to-image generation.

use super::file_url;
use crate::agent::{parse_args, AgentContext, AgentResponse, Capability, ImageGenerator};
use crate::error::Result;
use crate::session::{ContentBody, MsgStatus, OutputContent};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ImageArgs {
    prompt: String,
}

/// Generates a single image from a prompt.
pub struct ImageGenerationCapability {
    generator: Arc<dyn ImageGenerator>,
}

impl ImageGenerationCapability {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Capability for ImageGenerationCapability {
    fn name(&self) -> &str {
        "image_generation"
    }

    fn description(&self) -> &str {
        "Generate an image from a text prompt, for thumbnails, title cards or b-roll stills."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Detailed description of the image to generate"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn run(&self, args: Map<String, Value>, ctx: &mut AgentContext<'_>) -> Result<AgentResponse> {
        let args: ImageArgs = parse_args(self.name(), args)?;

        let idx = ctx
            .output
            .push_content(OutputContent::image(self.name(), "Generating image..."));
        ctx.output.push_update();

        match self.generator.generate_image(&args.prompt).await {
            Ok(path) => {
                let url = file_url(&path);
                info!("Generated image at {}", url);
                let entry = &mut ctx.output.content[idx];
                entry.body = ContentBody::Image { url: Some(url.clone()) };
                entry.finish(MsgStatus::Success, "Here is your generated image");
                ctx.output.push_update();
                Ok(AgentResponse::success(
                    "Image generated and shown to the user",
                    json!({ "image_url": url }),
                ))
            }
            Err(e) => {
                ctx.output.content[idx].finish(MsgStatus::Error, "Failed to generate image");
                ctx.output.push_update();
                Ok(AgentResponse::error(format!("Image generation failed: {}", e)))
            }
        }
    }
}
