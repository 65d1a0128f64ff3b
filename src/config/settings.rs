//! Configuration settings for Montage.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub llm: LlmSettings,
    pub reasoning: ReasoningSettings,
    pub session_store: SessionStoreSettings,
    pub library: LibrarySettings,
    pub media: MediaSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.montage".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Reasoning model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// LLM provider (openai).
    pub provider: String,
    /// Chat model used for reasoning and summaries.
    pub model: String,
    /// Base URL override for OpenAI-compatible endpoints.
    pub api_base: Option<String>,
    /// Maximum tokens to generate per call.
    pub max_tokens: u32,
    /// Nucleus sampling.
    pub top_p: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-2024-11-20".to_string(),
            api_base: None,
            max_tokens: 4096,
            top_p: 1.0,
            timeout_secs: 120,
        }
    }
}

/// Orchestration loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningSettings {
    /// Maximum LLM reasoning calls per turn.
    pub max_iterations: usize,
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStoreSettings {
    /// Store provider (sqlite, memory).
    pub provider: String,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
}

impl Default for SessionStoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.montage/sessions.db".to_string(),
        }
    }
}

/// Media library catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// TOML catalog describing collections, videos and images.
    pub catalog_path: String,
    /// Collection used when a chat request names none.
    pub default_collection: Option<String>,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            catalog_path: "~/.montage/library.toml".to_string(),
            default_collection: None,
        }
    }
}

/// Settings for the built-in media generation capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    /// Directory where generated media is written.
    pub output_dir: String,
    /// Image generation model.
    pub image_model: String,
    /// Image size (e.g. 1024x1024).
    pub image_size: String,
    /// Text-to-speech model.
    pub speech_model: String,
    /// Default text-to-speech voice.
    pub voice: String,
    /// Maximum concurrent generation requests inside one capability call.
    pub max_concurrent: usize,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            output_dir: "~/.montage/media".to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            speech_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            max_concurrent: 3,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::MontageError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("montage")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.session_store.sqlite_path)
    }

    /// Get the expanded library catalog path.
    pub fn catalog_path(&self) -> PathBuf {
        Self::expand_path(&self.library.catalog_path)
    }

    /// Get the expanded generated-media directory.
    pub fn media_dir(&self) -> PathBuf {
        Self::expand_path(&self.media.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [reasoning]
            max_iterations = 4

            [llm]
            model = "gpt-4o-mini"
            "#,
        )
        .unwrap();

        assert_eq!(settings.reasoning.max_iterations, 4);
        assert_eq!(settings.llm.model, "gpt-4o-mini");
        assert_eq!(settings.llm.max_tokens, 4096);
        assert_eq!(settings.session_store.provider, "sqlite");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut settings = Settings::default();
        settings.media.voice = "nova".to_string();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.media.voice, "nova");
        assert_eq!(loaded.reasoning.max_iterations, 10);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = PathBuf::from("/nonexistent/montage/config.toml");
        let settings = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(settings.library.catalog_path, "~/.montage/library.toml");
    }
}
