//! Interactive chat command over one session.

use super::run::{drive_turn, TurnOptions};
use crate::cli::Output;
use crate::config::Settings;
use crate::handler::ChatHandler;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};
use tracing::debug;

/// Run the interactive chat command.
pub async fn run_chat(options: TurnOptions, settings: Settings) -> Result<()> {
    let handler = ChatHandler::new(&settings)?;
    let mut session_id = options.session_id();

    println!("\n{}", style("Montage Chat").bold().blue());
    println!(
        "{}",
        style("Type a message, 'new' to start a fresh session, or 'exit' to quit.").dim()
    );
    println!(
        "{}\n",
        style(format!(
            "Model {} with {} agent(s). Ctrl+C stops a running turn.",
            handler.model_name(),
            handler.registry().len()
        ))
        .dim()
    );
    Output::kv("Session", &session_id);
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("new") {
            session_id = TurnOptions::default().session_id();
            Output::info("Started a new session.");
            Output::kv("Session", &session_id);
            continue;
        }

        debug!("Sending turn to session {}", session_id);
        match drive_turn(&handler, options.request(&session_id, input)).await {
            Ok(output) => Output::turn_result(&output),
            Err(e) => Output::error(&format!("Error: {}", e)),
        }
    }

    Ok(())
}
