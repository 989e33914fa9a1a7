//! One-shot sweeps: `hive cron janitors|task-coordinator`.
//!
//! Runs the same sweep the cron routes do, against the configured database,
//! and prints the JSON report on stdout.

use anyhow::{Context, Result};
use hive::clients::{PoolManagerClient, StakworkClient};
use hive::config::HiveToml;
use hive::cron::{run_janitor_sweep, run_task_coordinator};
use hive::db::{DbHandle, HiveDb};

use super::super::CronCommands;

pub async fn cmd_cron(config: &HiveToml, command: CronCommands) -> Result<()> {
    let db_path = &config.database.path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = DbHandle::new(HiveDb::new(db_path)?);
    let workflow = StakworkClient::new(&config.stakwork.base_url, config.stakwork.api_key.clone());

    let report = match command {
        CronCommands::Janitors => {
            serde_json::to_string_pretty(&run_janitor_sweep(&db, config, &workflow).await?)?
        }
        CronCommands::TaskCoordinator => {
            let pool = PoolManagerClient::new(
                &config.pool_manager.base_url,
                config.pool_manager.api_key.clone(),
            );
            serde_json::to_string_pretty(
                &run_task_coordinator(&db, config, &workflow, &pool).await?,
            )?
        }
    };
    println!("{report}");
    Ok(())
}
