//! Agents command - list available capabilities.

use crate::agent::builtin_registry;
use crate::cli::Output;
use crate::config::Settings;
use crate::library::{CatalogLibrary, MediaLibrary};
use anyhow::Result;
use std::sync::Arc;

/// Run the agents command.
pub fn run_agents(settings: &Settings) -> Result<()> {
    let library: Arc<dyn MediaLibrary> = Arc::new(CatalogLibrary::load(&settings.catalog_path())?);
    let registry = builtin_registry(settings, library)?;

    Output::header("Available Agents");
    println!();
    for capability in registry.iter() {
        Output::agent_info(capability.name(), capability.description());
    }
    println!();
    Output::info(&format!(
        "{} agent(s). Restrict a turn with --agent <name>.",
        registry.len()
    ));

    Ok(())
}
