//! Run command - send one message and print the outcome.

use crate::cli::Output;
use crate::config::Settings;
use crate::handler::{ChatHandler, ChatRequest};
use crate::session::OutputMessage;
use anyhow::Result;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Options shared by `run` and `chat`.
#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    pub session: Option<String>,
    pub collection: Option<String>,
    pub video: Option<String>,
    pub agents: Vec<String>,
}

impl TurnOptions {
    /// Session to use, generating a fresh id when none was given.
    pub(crate) fn session_id(&self) -> String {
        self.session
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    pub(crate) fn request(&self, session_id: &str, content: &str) -> ChatRequest {
        ChatRequest {
            session_id: Some(session_id.to_string()),
            collection_id: self.collection.clone(),
            video_id: self.video.clone(),
            content: content.to_string(),
            agents: self.agents.clone(),
        }
    }
}

/// Run the run command.
pub async fn run_run(message: &str, options: TurnOptions, json: bool, settings: Settings) -> Result<()> {
    let handler = ChatHandler::new(&settings)?;
    let session_id = options.session_id();
    let request = options.request(&session_id, message);

    let output = if json {
        handler.chat(request).await?
    } else {
        drive_turn(&handler, request).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        Output::turn_result(&output);
        Output::kv("Session", &session_id);
    }

    Ok(())
}

/// Run one turn while printing its actions live. Ctrl+C stops the turn.
pub(crate) async fn drive_turn(handler: &ChatHandler, request: ChatRequest) -> Result<OutputMessage> {
    let session_id = request.session_id.clone().unwrap_or_default();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputMessage>();

    let printer = tokio::spawn(async move {
        let spinner = Output::spinner("Thinking...");
        let mut seen = 0;
        while let Some(snapshot) = rx.recv().await {
            for action in snapshot.actions.iter().skip(seen) {
                spinner.suspend(|| Output::action(action));
                spinner.set_message(action.clone());
            }
            seen = snapshot.actions.len();
        }
        spinner.finish_and_clear();
    });

    let turn = handler.chat_with_updates(request, tx);
    tokio::pin!(turn);

    let result = tokio::select! {
        result = &mut turn => result,
        _ = tokio::signal::ctrl_c() => {
            if handler.stop(&session_id) {
                Output::warning("Stopping the current turn...");
            }
            turn.await
        }
    };

    // The channel closes once the turn's output is dropped or detached.
    printer.await?;
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_options() {
        let options = TurnOptions {
            session: Some("s1".to_string()),
            collection: Some("c1".to_string()),
            video: None,
            agents: vec!["storyboarding".to_string()],
        };

        let session_id = options.session_id();
        assert_eq!(session_id, "s1");

        let request = options.request(&session_id, "draw it");
        assert_eq!(request.session_id.as_deref(), Some("s1"));
        assert_eq!(request.collection_id.as_deref(), Some("c1"));
        assert_eq!(request.content, "draw it");
        assert_eq!(request.agents, vec!["storyboarding"]);
    }

    #[test]
    fn test_new_session_id_generated() {
        let options = TurnOptions::default();
        assert!(Uuid::parse_str(&options.session_id()).is_ok());
    }
}
