//! Media generators backing the built-in capabilities.

use crate::config::MediaSettings;
use crate::error::{MontageError, Result};
use crate::openai::{create_client, map_error};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    CreateImageRequestArgs, CreateSpeechRequestArgs, ImageModel, ImageResponseFormat, ImageSize,
    SpeechModel, Voice,
};
use async_openai::Client;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Trait for text-to-image generators.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image and return the path it was saved to.
    async fn generate_image(&self, prompt: &str) -> Result<PathBuf>;
}

/// Trait for text-to-speech generators.
#[async_trait]
pub trait SpeechGenerator: Send + Sync {
    /// Synthesize speech and return the path of the audio file.
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<PathBuf>;
}

/// Image generator using the OpenAI images API.
pub struct OpenAiImageGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    size: ImageSize,
    output_dir: PathBuf,
}

impl OpenAiImageGenerator {
    pub fn new(settings: &MediaSettings, output_dir: &Path) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: settings.image_model.clone(),
            size: parse_image_size(&settings.image_size)?,
            output_dir: output_dir.join("images"),
        })
    }
}

fn parse_image_size(size: &str) -> Result<ImageSize> {
    match size {
        "256x256" => Ok(ImageSize::S256x256),
        "512x512" => Ok(ImageSize::S512x512),
        "1024x1024" => Ok(ImageSize::S1024x1024),
        "1792x1024" => Ok(ImageSize::S1792x1024),
        "1024x1792" => Ok(ImageSize::S1024x1792),
        other => Err(MontageError::Config(format!("Unsupported image size: {}", other))),
    }
}

fn image_model(model: &str) -> ImageModel {
    match model {
        "dall-e-2" => ImageModel::DallE2,
        "dall-e-3" => ImageModel::DallE3,
        other => ImageModel::Other(other.to_string()),
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    #[instrument(skip(self), fields(model = %self.model))]
    async fn generate_image(&self, prompt: &str) -> Result<PathBuf> {
        let request = CreateImageRequestArgs::default()
            .prompt(prompt)
            .model(image_model(&self.model))
            .size(self.size.clone())
            .response_format(ImageResponseFormat::B64Json)
            .n(1)
            .build()
            .map_err(|e| MontageError::Capability(format!("Failed to build image request: {}", e)))?;

        let response = self
            .client
            .images()
            .create(request)
            .await
            .map_err(|e| map_error("Image generation failed", e))?;

        let paths = response
            .save(&self.output_dir)
            .await
            .map_err(|e| map_error("Failed to save image", e))?;

        let path = paths
            .into_iter()
            .next()
            .ok_or_else(|| MontageError::Capability("Image API returned no images".to_string()))?;
        debug!("Saved image to {:?}", path);
        Ok(path)
    }
}

/// Speech generator using the OpenAI speech API.
pub struct OpenAiSpeechGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    voice: String,
    output_dir: PathBuf,
}

impl OpenAiSpeechGenerator {
    pub fn new(settings: &MediaSettings, output_dir: &Path) -> Result<Self> {
        parse_voice(&settings.voice)?;
        Ok(Self {
            client: create_client()?,
            model: settings.speech_model.clone(),
            voice: settings.voice.clone(),
            output_dir: output_dir.join("audio"),
        })
    }
}

fn parse_voice(voice: &str) -> Result<Voice> {
    match voice.to_lowercase().as_str() {
        "alloy" => Ok(Voice::Alloy),
        "echo" => Ok(Voice::Echo),
        "fable" => Ok(Voice::Fable),
        "onyx" => Ok(Voice::Onyx),
        "nova" => Ok(Voice::Nova),
        "shimmer" => Ok(Voice::Shimmer),
        other => Err(MontageError::InvalidInput(format!("Unsupported voice: {}", other))),
    }
}

fn speech_model(model: &str) -> SpeechModel {
    match model {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

#[async_trait]
impl SpeechGenerator for OpenAiSpeechGenerator {
    #[instrument(skip(self, text), fields(model = %self.model, chars = text.len()))]
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<PathBuf> {
        let voice = parse_voice(voice.unwrap_or(&self.voice))?;

        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .voice(voice)
            .model(speech_model(&self.model))
            .build()
            .map_err(|e| MontageError::Capability(format!("Failed to build speech request: {}", e)))?;

        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e| map_error("Speech generation failed", e))?;

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!("speech-{}.mp3", Uuid::new_v4()));
        response
            .save(&path)
            .await
            .map_err(|e| map_error("Failed to save audio", e))?;

        debug!("Saved audio to {:?}", path);
        Ok(path)
    }
}
