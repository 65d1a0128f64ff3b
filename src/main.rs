//! Montage CLI entry point.

use anyhow::Result;
use clap::Parser;
use montage::cli::commands::{self, TurnOptions};
use montage::cli::{Cli, Commands};
use montage::config::Settings;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("montage={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let config_path = cli.config.as_ref().map(PathBuf::from);
    let settings = Settings::load_from(config_path.as_ref())?;

    std::fs::create_dir_all(settings.data_dir())?;

    match &cli.command {
        Commands::Chat {
            session,
            collection,
            video,
            agents,
        } => {
            let options = TurnOptions {
                session: session.clone(),
                collection: collection.clone(),
                video: video.clone(),
                agents: agents.clone(),
            };
            commands::run_chat(options, settings).await?;
        }

        Commands::Run {
            message,
            session,
            collection,
            video,
            agents,
            json,
        } => {
            let options = TurnOptions {
                session: session.clone(),
                collection: collection.clone(),
                video: video.clone(),
                agents: agents.clone(),
            };
            commands::run_run(message, options, *json, settings).await?;
        }

        Commands::Agents => {
            commands::run_agents(&settings)?;
        }

        Commands::Sessions { action } => {
            commands::run_sessions(action, &settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, *port, settings).await?;
        }

        Commands::Doctor => {
            commands::run_doctor(config_path, &settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, config_path, settings)?;
        }
    }

    Ok(())
}
