//! Catalog lookups over the media library.

use crate::agent::{parse_args, AgentContext, AgentResponse, Capability};
use crate::error::{MontageError, Result};
use crate::library::MediaLibrary;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum LibraryAction {
    ListCollections,
    ListVideos,
    VideoInfo,
    ListImages,
}

#[derive(Debug, Deserialize)]
struct LibraryArgs {
    action: LibraryAction,
    collection_id: Option<String>,
    video_id: Option<String>,
}

/// Lets the LLM browse collections, videos and images.
pub struct MediaLibraryCapability {
    library: Arc<dyn MediaLibrary>,
}

impl MediaLibraryCapability {
    pub fn new(library: Arc<dyn MediaLibrary>) -> Self {
        Self { library }
    }

    fn collection_id(args: &LibraryArgs, ctx: &AgentContext<'_>) -> Result<String> {
        args.collection_id
            .clone()
            .or_else(|| ctx.collection_id.clone())
            .ok_or_else(|| MontageError::InvalidInput("collection_id is required".to_string()))
    }
}

#[async_trait]
impl Capability for MediaLibraryCapability {
    fn name(&self) -> &str {
        "media_library"
    }

    fn description(&self) -> &str {
        "Look up collections, videos and images in the media library. \
         Use it to find video IDs, durations and stream URLs before calling other agents."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["list_collections", "list_videos", "video_info", "list_images"],
                    "description": "Lookup to perform"
                },
                "collection_id": {
                    "type": "string",
                    "description": "Collection to look in. Defaults to the session's collection."
                },
                "video_id": {
                    "type": "string",
                    "description": "Video to describe (video_info only). Defaults to the session's video."
                }
            },
            "required": ["action"]
        })
    }

    async fn run(&self, args: Map<String, Value>, ctx: &mut AgentContext<'_>) -> Result<AgentResponse> {
        let args: LibraryArgs = parse_args(self.name(), args)?;
        debug!("Media library lookup: {:?}", args.action);

        match args.action {
            LibraryAction::ListCollections => {
                let collections = self.library.list_collections().await?;
                let data: Vec<Value> = collections
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "name": c.name,
                            "description": c.description,
                            "videos": c.videos.len(),
                            "images": c.images.len(),
                        })
                    })
                    .collect();
                Ok(AgentResponse::success(
                    format!("Found {} collection(s)", data.len()),
                    json!({ "collections": data }),
                ))
            }
            LibraryAction::ListVideos => {
                let collection_id = Self::collection_id(&args, ctx)?;
                let Some(collection) = self.library.get_collection(&collection_id).await? else {
                    return Ok(AgentResponse::error(format!("Collection not found: {}", collection_id)));
                };
                Ok(AgentResponse::success(
                    format!("{} video(s) in {}", collection.videos.len(), collection.name),
                    json!({ "collection_id": collection.id, "videos": collection.videos }),
                ))
            }
            LibraryAction::ListImages => {
                let collection_id = Self::collection_id(&args, ctx)?;
                let Some(collection) = self.library.get_collection(&collection_id).await? else {
                    return Ok(AgentResponse::error(format!("Collection not found: {}", collection_id)));
                };
                Ok(AgentResponse::success(
                    format!("{} image(s) in {}", collection.images.len(), collection.name),
                    json!({ "collection_id": collection.id, "images": collection.images }),
                ))
            }
            LibraryAction::VideoInfo => {
                let collection_id = Self::collection_id(&args, ctx)?;
                let video_id = args
                    .video_id
                    .clone()
                    .or_else(|| ctx.video_id.clone())
                    .ok_or_else(|| MontageError::InvalidInput("video_id is required".to_string()))?;

                match self.library.get_video(&collection_id, &video_id).await? {
                    Some(video) => Ok(AgentResponse::success(video.summary_line(), json!(video))),
                    None => Ok(AgentResponse::error(format!("Video not found: {}", video_id))),
                }
            }
        }
    }
}
