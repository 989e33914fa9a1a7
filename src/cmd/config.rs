//! Configuration view and validation commands: `hive config`.

use std::path::Path;

use anyhow::Result;
use hive::config::HiveToml;

use super::super::ConfigCommands;

fn secret(value: &Option<String>) -> &'static str {
    if value.is_some() { "(set)" } else { "(not set)" }
}

fn optional<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}

fn print_config(config: &HiveToml) {
    println!("[server]");
    println!("  port = {}", config.server.port);
    println!("  public_url = {}", optional(&config.server.public_url));
    println!();

    println!("[database]");
    println!("  path = \"{}\"", config.database.path.display());
    println!();

    println!("[cron]");
    println!("  janitor_enabled = {}", config.cron.janitor_enabled);
    println!(
        "  task_coordinator_enabled = {}",
        config.cron.task_coordinator_enabled
    );
    println!("  secret = {}", secret(&config.cron.secret));
    println!();

    println!("[stakwork]");
    println!("  base_url = \"{}\"", config.stakwork.base_url);
    println!("  api_key = {}", secret(&config.stakwork.api_key));
    println!(
        "  janitor_workflow_id = {}",
        optional(&config.stakwork.janitor_workflow_id)
    );
    println!(
        "  task_workflow_id = {}",
        optional(&config.stakwork.task_workflow_id)
    );
    println!();

    println!("[pool_manager]");
    println!("  base_url = \"{}\"", config.pool_manager.base_url);
    println!("  api_key = {}", secret(&config.pool_manager.api_key));
    println!();

    println!("[storage]");
    println!("  base_url = \"{}\"", config.storage.base_url);
    println!("  signing_key = {}", secret(&config.storage.signing_key));
    println!(
        "  screenshot_url_ttl_secs = {}",
        config.storage.screenshot_url_ttl_secs
    );
    println!(
        "  artifact_url_ttl_secs = {}",
        config.storage.artifact_url_ttl_secs
    );
    println!();

    println!("[coordinator]");
    println!("  min_unused_vms = {}", config.coordinator.min_unused_vms);
    println!(
        "  max_items_per_workspace = {}",
        config.coordinator.max_items_per_workspace
    );
    println!(
        "  stale_agent_task_hours = {}",
        config.coordinator.stale_agent_task_hours
    );
    println!();

    println!("[workflow]");
    println!("  workspace_slug = \"{}\"", config.workflow.workspace_slug);
    println!();
}

/// `config show` and `config validate`. `config` already carries the
/// environment overrides.
pub fn cmd_config(
    config_path: &Path,
    config: &HiveToml,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Hive Configuration");
            println!("==================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No hive.toml found at {}; using defaults.", config_path.display());
            }
            println!("Effective values (with env overrides):");
            println!();
            print_config(config);
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => cmd_config_init(config_path)?,
    }
    Ok(())
}

/// Write a default hive.toml unless one already exists.
pub fn cmd_config_init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("hive.toml already exists at {}", config_path.display());
        println!("Delete it first if you want to recreate it.");
        return Ok(());
    }
    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    HiveToml::default().save(config_path)?;

    println!("Created hive.toml at {}", config_path.display());
    println!();
    println!("Secrets are best supplied through the environment:");
    println!("  - CRON_SECRET, STAKWORK_API_KEY, POOL_MANAGER_API_KEY, STORAGE_SIGNING_KEY");
    println!();
    Ok(())
}
