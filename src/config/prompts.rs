//! Prompt templates for Montage.
//!
//! Prompts can be customized by placing a `reasoning.toml` file in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Prompts {
    pub reasoning: ReasoningPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts used by the reasoning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningPrompts {
    /// Orientation prompt placed at the top of every fresh conversation.
    pub system: String,
    /// Appended after `system` when the session is bound to one video.
    pub video_context: String,
    /// Appended after `system` when the session works over a whole collection.
    pub collection_context: String,
    /// Transient instruction for the end-of-turn summary.
    pub summarization: String,
}

impl Default for ReasoningPrompts {
    fn default() -> Self {
        Self {
            system: r#"You are Montage, an assistant for video and audio production workflows.

1. Task handling
   - Pick the agents that fit the user's request and the conversation so far.
   - Give each agent precise arguments; chain agents when one needs another's output.
   - Keep going until the request is fully handled or the user asks you to stop.

2. Agent usage
   - Prefer the most specific agent for a task.
   - Use media_library to look up videos and images before asking the user for IDs.
   - Resolve missing inputs yourself when an agent can provide them.

3. Clarity and safety
   - Ask for confirmation when a request is ambiguous.
   - Do not reveal internal identifiers unless the user asks for them.
   - Keep the tone friendly and concise.

4. Knowledge
   - Do not answer from training data unless the user explicitly asks for it.
   - If the information is not available in the media or context, say so."#
                .to_string(),

            video_context: r#"
This video belongs to the collection "{{collection_name}}" (collection_id: {{collection_id}}).
Use it for search, summary and editing requests:
- title: {{video_name}}, video_id: {{video_id}}, description: {{video_description}}, length: {{video_length}}"#
                .to_string(),

            collection_context: r#"
This is the collection "{{collection_name}}" (collection_id: {{collection_id}}): {{collection_description}}

Videos in this collection the user may refer to:
{{videos}}

Images in this collection:
{{images}}"#
                .to_string(),

            summarization: r#"Write a short summary of what the agents did for the user's last request: "{{query}}".

1. List the tasks each agent handled and what came out of them.
2. Do not repeat raw agent responses unless the user asked for them.
3. Keep it friendly and free of technical jargon.
4. If anything failed, was left incomplete or needs the user's confirmation, say so clearly.
5. If the user seems unhappy, acknowledge it respectfully.
6. End by inviting the user to ask follow-up questions."#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let reasoning_path = custom_path.join("reasoning.toml");
            if reasoning_path.exists() {
                let content = std::fs::read_to_string(&reasoning_path)?;
                prompts.reasoning = toml::from_str(&content)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompts() {
        let prompts = Prompts::default();
        assert!(!prompts.reasoning.system.is_empty());
        assert!(!prompts.reasoning.summarization.is_empty());
        assert!(prompts.reasoning.video_context.contains("{{video_id}}"));
    }

    #[test]
    fn test_render_template() {
        let template = "Hello {{name}}, you have {{count}} clips.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());

        assert_eq!(Prompts::render(template, &vars), "Hello Alice, you have 5 clips.");
    }

    #[test]
    fn test_custom_variables_are_overridden_by_call_variables() {
        let mut custom = HashMap::new();
        custom.insert("studio".to_string(), "Northlight".to_string());
        custom.insert("tone".to_string(), "formal".to_string());
        let prompts = Prompts::load(None, Some(&custom)).unwrap();

        let mut vars = HashMap::new();
        vars.insert("tone".to_string(), "playful".to_string());

        let rendered = prompts.render_with_custom("{{studio}} / {{tone}}", &vars);
        assert_eq!(rendered, "Northlight / playful");
    }

    #[test]
    fn test_load_custom_reasoning_prompts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("reasoning.toml"),
            "summarization = \"Summarize in one line.\"\n",
        )
        .unwrap();

        let prompts = Prompts::load(dir.path().to_str(), None).unwrap();
        assert_eq!(prompts.reasoning.summarization, "Summarize in one line.");
        // Unset keys keep their defaults
        assert!(prompts.reasoning.system.contains("Montage"));
    }
}
