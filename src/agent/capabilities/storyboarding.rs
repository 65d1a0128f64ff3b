//! Storyboard generation: one frame per step, generated concurrently.

use super::file_url;
use crate::agent::{parse_args, AgentContext, AgentResponse, Capability, ImageGenerator, CANCELED_MESSAGE};
use crate::error::{MontageError, Result};
use crate::session::{ContentBody, MsgStatus, OutputContent};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Upper bound on frames per storyboard.
const MAX_STEPS: usize = 12;

#[derive(Debug, Deserialize)]
struct StoryboardArgs {
    concept: String,
    steps: Vec<StoryboardStep>,
}

#[derive(Debug, Deserialize)]
struct StoryboardStep {
    step: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct FrameResult {
    step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Turns a list of storyboard steps into frames.
pub struct StoryboardingCapability {
    generator: Arc<dyn ImageGenerator>,
    max_concurrent: usize,
}

impl StoryboardingCapability {
    pub fn new(generator: Arc<dyn ImageGenerator>, max_concurrent: usize) -> Self {
        Self {
            generator,
            max_concurrent: max_concurrent.max(1),
        }
    }

    fn frame_prompt(concept: &str, step: &StoryboardStep) -> String {
        format!(
            "Storyboard frame for \"{}\". Scene: {}. {}. Cinematic still, consistent visual style.",
            concept, step.step, step.description
        )
    }
}

#[async_trait]
impl Capability for StoryboardingCapability {
    fn name(&self) -> &str {
        "storyboarding"
    }

    fn description(&self) -> &str {
        "Create a storyboard for a video concept: one generated frame per step."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "concept": {
                    "type": "string",
                    "description": "Overall idea of the video"
                },
                "steps": {
                    "type": "array",
                    "description": "Ordered storyboard steps",
                    "items": {
                        "type": "object",
                        "properties": {
                            "step": {"type": "string", "description": "Short step title"},
                            "description": {"type": "string", "description": "What the frame shows"}
                        },
                        "required": ["step", "description"]
                    }
                }
            },
            "required": ["concept", "steps"]
        })
    }

    async fn run(&self, args: Map<String, Value>, ctx: &mut AgentContext<'_>) -> Result<AgentResponse> {
        let args: StoryboardArgs = parse_args(self.name(), args)?;
        if args.steps.is_empty() {
            return Err(MontageError::InvalidInput("steps must not be empty".to_string()));
        }
        if args.steps.len() > MAX_STEPS {
            return Err(MontageError::InvalidInput(format!(
                "a storyboard has at most {} steps",
                MAX_STEPS
            )));
        }

        info!(
            "Generating {} storyboard frame(s) for \"{}\"",
            args.steps.len(),
            args.concept
        );

        let entries: Vec<usize> = args
            .steps
            .iter()
            .map(|s| {
                ctx.output.push_content(OutputContent::image(
                    self.name(),
                    &format!("Drawing frame: {}", s.step),
                ))
            })
            .collect();
        ctx.output.push_update();

        let stop = ctx.stop_token();
        let mut frames: Vec<Option<FrameResult>> = args.steps.iter().map(|_| None).collect();

        let prompts: Vec<(usize, String)> = args
            .steps
            .iter()
            .enumerate()
            .map(|(idx, step)| (idx, Self::frame_prompt(&args.concept, step)))
            .collect();

        let generator = Arc::clone(&self.generator);
        let mut stream = stream::iter(prompts)
            .map(move |(idx, prompt)| {
                let stop = stop.clone();
                let generator = Arc::clone(&generator);
                async move {
                    if stop.is_cancelled() {
                        return (idx, Err(MontageError::Capability(CANCELED_MESSAGE.to_string())));
                    }
                    (idx, generator.generate_image(&prompt).await)
                }
            })
            .buffer_unordered(self.max_concurrent);

        while let Some((idx, result)) = stream.next().await {
            let step = args.steps[idx].step.clone();
            let entry = &mut ctx.output.content[entries[idx]];
            frames[idx] = Some(match result {
                Ok(path) => {
                    let url = file_url(&path);
                    entry.body = ContentBody::Image { url: Some(url.clone()) };
                    entry.finish(MsgStatus::Success, &format!("Frame ready: {}", step));
                    FrameResult {
                        step,
                        image_url: Some(url),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Storyboard frame {} failed: {}", idx, e);
                    entry.finish(MsgStatus::Error, &format!("Frame failed: {}", step));
                    FrameResult {
                        step,
                        image_url: None,
                        error: Some(e.to_string()),
                    }
                }
            });
            ctx.output.push_update();
        }

        let frames: Vec<FrameResult> = frames.into_iter().flatten().collect();
        let failed = frames.iter().filter(|f| f.error.is_some()).count();
        let data = json!({ "concept": &args.concept, "frames": frames });

        if failed == 0 {
            Ok(AgentResponse::success(
                format!("Storyboard with {} frame(s) generated and shown to the user", frames.len()),
                data,
            ))
        } else {
            Ok(AgentResponse {
                data,
                ..AgentResponse::error(format!("{} of {} storyboard frame(s) failed", failed, frames.len()))
            })
        }
    }
}
