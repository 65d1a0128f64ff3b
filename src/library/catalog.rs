//! TOML-backed media catalog.
//!
//! ```toml
//! [[collections]]
//! id = "c-travel"
//! name = "Travel"
//! description = "Raw footage from the coast trip"
//!
//! [[collections.videos]]
//! id = "v-sunset"
//! name = "Sunset at the pier"
//! length = 42.0
//! ```

use super::{Collection, MediaLibrary};
use crate::error::{MontageError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    collections: Vec<Collection>,
}

/// Read-only library loaded from a TOML catalog file.
pub struct CatalogLibrary {
    collections: Vec<Collection>,
}

impl CatalogLibrary {
    /// Load a catalog from disk. A missing file yields an empty library.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No media catalog at {:?}, starting with an empty library", path);
            return Ok(Self::from_collections(Vec::new()));
        }

        let content = std::fs::read_to_string(path)?;
        let file: CatalogFile = toml::from_str(&content)
            .map_err(|e| MontageError::Library(format!("Invalid catalog {:?}: {}", path, e)))?;

        info!("Loaded {} collection(s) from {:?}", file.collections.len(), path);
        Ok(Self::from_collections(file.collections))
    }

    /// Build a library from in-memory collections.
    pub fn from_collections(collections: Vec<Collection>) -> Self {
        Self { collections }
    }
}

#[async_trait]
impl MediaLibrary for CatalogLibrary {
    async fn list_collections(&self) -> Result<Vec<Collection>> {
        Ok(self.collections.clone())
    }

    async fn get_collection(&self, collection_id: &str) -> Result<Option<Collection>> {
        Ok(self.collections.iter().find(|c| c.id == collection_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
[[collections]]
id = "c-travel"
name = "Travel"
description = "Raw footage from the coast trip"

[[collections.videos]]
id = "v-sunset"
name = "Sunset at the pier"
length = 42.0
stream_url = "https://stream.example/v-sunset.m3u8"

[[collections.images]]
id = "i-map"
name = "Route map"
"#;

    #[tokio::test]
    async fn test_load_catalog_and_lookup_video() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.toml");
        std::fs::write(&path, CATALOG).unwrap();

        let library = CatalogLibrary::load(&path).unwrap();
        let collection = library.get_collection("c-travel").await.unwrap().unwrap();
        assert_eq!(collection.videos.len(), 1);
        assert_eq!(collection.images[0].url, None);

        let video = library.get_video("c-travel", "v-sunset").await.unwrap().unwrap();
        assert_eq!(video.length, 42.0);
        assert!(library.get_video("c-travel", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_catalog_is_empty() {
        let library = CatalogLibrary::load(Path::new("/nonexistent/library.toml")).unwrap();
        assert!(library.list_collections().await.unwrap().is_empty());
    }

    #[test]
    fn test_invalid_catalog_is_library_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.toml");
        std::fs::write(&path, "[[collections]]\nname = 3\n").unwrap();

        let err = CatalogLibrary::load(&path).err().unwrap();
        assert!(matches!(err, MontageError::Library(_)));
    }
}
