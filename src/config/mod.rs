//! Configuration module for Montage.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, ReasoningPrompts};
pub use settings::{
    GeneralSettings, LibrarySettings, LlmSettings, MediaSettings, PromptSettings,
    ReasoningSettings, SessionStoreSettings, Settings,
};
