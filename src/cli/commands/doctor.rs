//! Doctor command - verify credentials, storage and the media catalog.

use crate::cli::Output;
use crate::config::Settings;
use crate::library::{CatalogLibrary, MediaLibrary};
use crate::store::open_store;
use console::style;
use std::path::{Path, PathBuf};

/// Check result for a single item.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl CheckResult {
    fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Ok,
            message: message.to_string(),
            hint: None,
        }
    }

    fn warning(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn error(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Error,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }

    fn print(&self) {
        let icon = match self.status {
            CheckStatus::Ok => style("✓").green(),
            CheckStatus::Warning => style("!").yellow(),
            CheckStatus::Error => style("✗").red(),
        };

        println!("  {} {} - {}", icon, style(&self.name).bold(), self.message);

        if let Some(hint) = &self.hint {
            println!("    {} {}", style("→").dim(), style(hint).dim());
        }
    }
}

/// Run all diagnostic checks.
pub async fn run_doctor(config_path: Option<PathBuf>, settings: &Settings) -> anyhow::Result<()> {
    Output::header("Montage Doctor");
    println!();
    println!("Checking credentials, storage and configuration...\n");

    let mut checks = Vec::new();

    println!("{}", style("API Configuration").bold());
    let api_checks = vec![
        check_openai_api_key(std::env::var("OPENAI_API_KEY").ok().as_deref()),
        CheckResult::ok(
            "Model",
            &format!("{} via {}", settings.llm.model, settings.llm.provider),
        ),
    ];
    print_section(&mut checks, api_checks);

    println!("{}", style("Storage").bold());
    let mut storage_checks = check_directories(settings);
    storage_checks.push(check_session_store(settings).await);
    print_section(&mut checks, storage_checks);

    println!("{}", style("Media Library").bold());
    let library_check = check_catalog(&settings.catalog_path()).await;
    print_section(&mut checks, vec![library_check]);

    println!("{}", style("Configuration").bold());
    let config_path = config_path.unwrap_or_else(Settings::default_config_path);
    print_section(&mut checks, vec![check_config_file(&config_path)]);

    let errors = checks.iter().filter(|c| c.status == CheckStatus::Error).count();
    let warnings = checks.iter().filter(|c| c.status == CheckStatus::Warning).count();

    if errors > 0 {
        Output::error(&format!(
            "{} error(s) found. Please fix them before using Montage.",
            errors
        ));
        std::process::exit(1);
    } else if warnings > 0 {
        Output::warning(&format!("All checks passed with {} warning(s).", warnings));
    } else {
        Output::success("All checks passed! Montage is ready to use.");
    }

    Ok(())
}

fn print_section(all: &mut Vec<CheckResult>, section: Vec<CheckResult>) {
    for check in &section {
        check.print();
    }
    println!();
    all.extend(section);
}

/// Check the OpenAI API key without printing it.
fn check_openai_api_key(key: Option<&str>) -> CheckResult {
    match key {
        Some(key) if key.starts_with("sk-") && key.len() > 20 => {
            CheckResult::ok("OPENAI_API_KEY", &format!("configured ({})", mask_key(key)))
        }
        Some("") => CheckResult::error(
            "OPENAI_API_KEY",
            "empty",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
        Some(_) => CheckResult::warning(
            "OPENAI_API_KEY",
            "set but format looks unusual",
            "Expected format: sk-... (OpenAI API key)",
        ),
        None => CheckResult::error(
            "OPENAI_API_KEY",
            "not set",
            "Set with: export OPENAI_API_KEY='sk-...'",
        ),
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 11 {
        return "***".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Check data and media directories.
fn check_directories(settings: &Settings) -> Vec<CheckResult> {
    let dirs = [
        ("Data directory", settings.data_dir()),
        ("Media directory", settings.media_dir()),
    ];

    dirs.iter()
        .map(|(name, dir)| {
            if dir.exists() {
                CheckResult::ok(name, &dir.display().to_string())
            } else {
                CheckResult::warning(
                    name,
                    &format!("{} (will be created)", dir.display()),
                    "Created on first use",
                )
            }
        })
        .collect()
}

async fn check_session_store(settings: &Settings) -> CheckResult {
    let name = format!("Session store ({})", settings.session_store.provider);
    match open_store(settings) {
        Ok(store) if store.health_check().await => CheckResult::ok(&name, "reachable"),
        Ok(_) => CheckResult::error(
            &name,
            "health check failed",
            "Check that the database file is readable and not locked",
        ),
        Err(e) => CheckResult::error(
            &name,
            &e.to_string(),
            "Set session_store.provider to \"sqlite\" or \"memory\"",
        ),
    }
}

async fn check_catalog(path: &Path) -> CheckResult {
    if !path.exists() {
        return CheckResult::warning(
            "Catalog",
            &format!("{} not found", path.display()),
            "Describe your collections in a catalog file to give the assistant context",
        );
    }

    let library = match CatalogLibrary::load(path) {
        Ok(library) => library,
        Err(e) => {
            return CheckResult::error("Catalog", &e.to_string(), "Fix the catalog TOML syntax")
        }
    };

    match library.list_collections().await {
        Ok(collections) => {
            let videos: usize = collections.iter().map(|c| c.videos.len()).sum();
            CheckResult::ok(
                "Catalog",
                &format!("{} collection(s), {} video(s)", collections.len(), videos),
            )
        }
        Err(e) => CheckResult::error("Catalog", &e.to_string(), "Fix the catalog file"),
    }
}

fn check_config_file(config_path: &Path) -> CheckResult {
    if config_path.exists() {
        match std::fs::read_to_string(config_path) {
            Ok(content) => match toml::from_str::<Settings>(&content) {
                Ok(_) => CheckResult::ok("Config file", &config_path.display().to_string()),
                Err(e) => CheckResult::error(
                    "Config file",
                    &format!("parse error: {}", e),
                    "Fix the TOML syntax in your config file",
                ),
            },
            Err(e) => CheckResult::error(
                "Config file",
                &format!("read error: {}", e),
                "Check file permissions",
            ),
        }
    } else {
        CheckResult::ok("Config file", "using defaults (no config file)")
    }
}
