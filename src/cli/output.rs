//! CLI output formatting utilities.

use crate::session::{ContentBody, MsgStatus, OutputContent, OutputMessage};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print an agent with its description.
    pub fn agent_info(name: &str, description: &str) {
        println!(
            "  {} {} {}",
            style("*").cyan(),
            style(format!("@{}", name)).bold(),
            style(description).dim()
        );
    }

    /// Print one engine action, as shown while a turn runs.
    pub fn action(action: &str) {
        println!("  {} {}", style("~").dim(), style(action).dim());
    }

    /// Print a non-text content entry (images, audio).
    pub fn media_entry(entry: &OutputContent) {
        let icon = status_icon(entry.status);
        let location = match &entry.body {
            ContentBody::Image { url } | ContentBody::Audio { url } => url.as_deref(),
            ContentBody::Text { .. } => return,
        };
        println!(
            "  {} {} {}",
            icon,
            style(&entry.agent_name).bold(),
            entry.status_message
        );
        if let Some(location) = location {
            println!("    {}", style(location).cyan());
        }
    }

    /// Print the final state of a turn: media entries first, then the assistant's answer.
    pub fn turn_result(output: &OutputMessage) {
        for entry in &output.content {
            Output::media_entry(entry);
        }

        match output.final_text() {
            Some(text) if !text.is_empty() => {
                println!("\n{} {}\n", style("Montage:").blue().bold(), text);
            }
            _ => println!(),
        }

        if output.status == MsgStatus::Error {
            Output::warning("The turn finished with errors.");
        }
    }

    /// Print a stored conversation entry preview.
    pub fn conversation_line(who: &str, conv_id: &str, text: &str) {
        println!(
            "  {} {} {}",
            style(who).bold(),
            style(short_id(conv_id)).dim(),
            content_preview(text, 120)
        );
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

fn status_icon(status: MsgStatus) -> console::StyledObject<&'static str> {
    match status {
        MsgStatus::Success => style("✓").green(),
        MsgStatus::Progress => style("…").yellow(),
        MsgStatus::Error => style("✗").red(),
    }
}

/// First eight characters of an id.
pub(crate) fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Truncate content with ellipsis.
pub(crate) fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    match content.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &content[..idx]),
        None => content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview_truncates_on_char_boundary() {
        assert_eq!(content_preview("short", 10), "short");
        assert_eq!(content_preview("line one\nline two", 8), "line one...");
        assert_eq!(content_preview("ååååå", 3), "ååå...");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
