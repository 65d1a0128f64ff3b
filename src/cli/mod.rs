//! CLI module for Montage.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Montage - chat-driven video and audio production
///
/// Talk to an assistant that plans the work and calls media agents
/// (library lookups, image and audio generation, storyboards) on your behalf.
#[derive(Parser, Debug)]
#[command(name = "montage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Resume an existing session
        #[arg(short, long)]
        session: Option<String>,

        /// Collection the session works on
        #[arg(long)]
        collection: Option<String>,

        /// Video the session works on
        #[arg(long)]
        video: Option<String>,

        /// Only allow these agents (repeatable)
        #[arg(short, long = "agent")]
        agents: Vec<String>,
    },

    /// Send a single message and print the result
    Run {
        /// The message to send
        message: String,

        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,

        /// Collection the session works on
        #[arg(long)]
        collection: Option<String>,

        /// Video the session works on
        #[arg(long)]
        video: Option<String>,

        /// Only allow these agents (repeatable)
        #[arg(short, long = "agent")]
        agents: Vec<String>,

        /// Print the output message as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the available agents
    Agents,

    /// Inspect stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Check API credentials, storage and the media catalog
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionsAction {
    /// List sessions, most recent first
    List,

    /// Show a session and its conversation
    Show {
        /// Session ID
        id: String,
    },

    /// Delete a session
    Delete {
        /// Session ID
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_parses_repeated_agents() {
        let cli = Cli::parse_from([
            "montage",
            "-vv",
            "run",
            "make a storyboard",
            "--agent",
            "storyboarding",
            "--agent",
            "media_library",
            "--video",
            "v1",
        ]);

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                message,
                agents,
                video,
                session,
                json,
                ..
            } => {
                assert_eq!(message, "make a storyboard");
                assert_eq!(agents, vec!["storyboarding", "media_library"]);
                assert_eq!(video.as_deref(), Some("v1"));
                assert!(session.is_none());
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_sessions_show_requires_id() {
        assert!(Cli::try_parse_from(["montage", "sessions", "show"]).is_err());
        let cli = Cli::try_parse_from(["montage", "sessions", "show", "abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Sessions {
                action: SessionsAction::Show { ref id }
            } if id == "abc"
        ));
    }
}
