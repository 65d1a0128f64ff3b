//! Built-in capabilities.

mod audio_generation;
mod image_generation;
mod media_library;
mod storyboarding;

pub use audio_generation::AudioGenerationCapability;
pub use image_generation::ImageGenerationCapability;
pub use media_library::MediaLibraryCapability;
pub use storyboarding::StoryboardingCapability;

use std::path::Path;

/// URL under which a locally generated file is reported.
pub(crate) fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}
