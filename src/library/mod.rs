//! Media library abstraction.
//!
//! The library describes the collections, videos and images a session works
//! over. The reasoning engine uses it to orient the LLM at the start of a
//! conversation, and the `media_library` capability exposes it as a tool.

mod catalog;

pub use catalog::CatalogLibrary;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A named group of media assets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub videos: Vec<Video>,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// A video asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Video {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Length in seconds.
    #[serde(default)]
    pub length: f64,
    #[serde(default)]
    pub stream_url: Option<String>,
}

impl Video {
    /// One-line description used in prompts and tool output.
    pub fn summary_line(&self) -> String {
        format!(
            "- title: {}, video_id: {}, description: {}, length: {:.0}s, stream: {}",
            self.name,
            self.id,
            self.description,
            self.length,
            self.stream_url.as_deref().unwrap_or("n/a")
        )
    }
}

/// An image asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl Image {
    pub fn summary_line(&self) -> String {
        format!(
            "- title: {}, image_id: {}, url: {}",
            self.name,
            self.id,
            self.url.as_deref().unwrap_or("n/a")
        )
    }
}

/// Trait for media library implementations.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// List all collections.
    async fn list_collections(&self) -> Result<Vec<Collection>>;

    /// Get a collection with its videos and images.
    async fn get_collection(&self, collection_id: &str) -> Result<Option<Collection>>;

    /// Get a single video from a collection.
    async fn get_video(&self, collection_id: &str, video_id: &str) -> Result<Option<Video>> {
        let collection = self.get_collection(collection_id).await?;
        Ok(collection.and_then(|c| c.videos.into_iter().find(|v| v.id == video_id)))
    }
}
