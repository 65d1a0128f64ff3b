//! Sessions command - list, show and delete stored sessions.

use crate::cli::output::{content_preview, short_id};
use crate::cli::{Output, SessionsAction};
use crate::config::Settings;
use crate::handler::SessionHandler;
use crate::session::ConversationMessage;
use crate::store::open_store;
use anyhow::Result;
use console::style;

/// Run the sessions command.
pub async fn run_sessions(action: &SessionsAction, settings: &Settings) -> Result<()> {
    let sessions = SessionHandler::new(open_store(settings)?);

    match action {
        SessionsAction::List => {
            let records = sessions.list().await?;
            if records.is_empty() {
                Output::info("No sessions yet. Start one with 'montage chat'.");
                return Ok(());
            }

            Output::header(&format!("Sessions ({})", records.len()));
            println!();
            for record in &records {
                let target = match (&record.collection_id, &record.video_id) {
                    (_, Some(video)) => format!("video {}", video),
                    (Some(collection), None) => format!("collection {}", collection),
                    (None, None) => "no collection".to_string(),
                };
                println!(
                    "  {} {} {} {}",
                    style("*").cyan(),
                    style(&record.session_id).bold(),
                    style(record.updated_at.format("%Y-%m-%d %H:%M")).dim(),
                    target
                );
            }
        }

        SessionsAction::Show { id } => {
            let details = sessions.get(id).await?;

            Output::header(&format!("Session {}", short_id(&details.record.session_id)));
            Output::kv("ID", &details.record.session_id);
            Output::kv(
                "Collection",
                details.record.collection_id.as_deref().unwrap_or("-"),
            );
            Output::kv("Video", details.record.video_id.as_deref().unwrap_or("-"));
            Output::kv(
                "Created",
                &details.record.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            );
            println!();

            for message in &details.conversation {
                match message {
                    ConversationMessage::Input(input) => {
                        Output::conversation_line("You", &input.conv_id, &input.content);
                    }
                    ConversationMessage::Output(output) => {
                        let text = output.final_text().unwrap_or("");
                        let summary = if text.is_empty() {
                            format!("[{}] {} entr(ies)", output.status, output.content.len())
                        } else {
                            format!("[{}] {}", output.status, content_preview(text, 200))
                        };
                        Output::conversation_line("Montage", &output.conv_id, &summary);
                    }
                }
            }
        }

        SessionsAction::Delete { id } => {
            sessions.delete(id).await?;
            Output::success(&format!("Deleted session {}", id));
        }
    }

    Ok(())
}
