//! Server and database commands: `hive serve`, `hive init-db`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use hive::config::HiveToml;
use hive::db::HiveDb;
use hive::server::{ServerConfig, start_server};

pub async fn cmd_serve(
    config: HiveToml,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    let server = ServerConfig {
        port: port.unwrap_or(config.server.port),
        db_path: db_path.unwrap_or_else(|| config.database.path.clone()),
        dev_mode: dev,
    };
    start_server(server, config).await
}

pub fn cmd_init_db(config: &HiveToml, db_path: Option<PathBuf>) -> Result<()> {
    let db_path = db_path.unwrap_or_else(|| config.database.path.clone());
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    HiveDb::new(&db_path)?;
    println!("Hive database initialized at {}", db_path.display());
    Ok(())
}
