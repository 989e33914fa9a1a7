//! HTTP surface of Hive.
//!
//! | Module       | Routes                                               |
//! |--------------|------------------------------------------------------|
//! | `cron`       | `/api/cron/*` sweep triggers                         |
//! | `workspaces` | workspaces, members and tasks                        |
//! | `janitors`   | janitor config, runs, recommendations and webhook    |
//! | `media`      | screenshots and signed artifact URLs                 |
//! | `pool`       | Pool Manager proxy                                   |
//! | `gitsee`     | GitSee trigger                                       |
//! | `prompts`    | Stakwork prompt library proxy                        |

pub mod api;
pub mod auth;
pub mod cron;
pub mod gitsee;
pub mod janitors;
pub mod media;
pub mod pool;
pub mod prompts;
pub mod workspaces;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::clients::{HttpGitSeeClient, PoolManagerClient, StakworkClient, UrlSigner};
use crate::config::HiveToml;
use crate::db::{DbHandle, HiveDb};
use api::{AppState, SharedState};

/// Settings for `hive serve`, resolved from flags over hive.toml.
pub struct ServerConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
}

pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire the real service clients into shared state.
pub fn build_state(db: HiveDb, config: HiveToml) -> SharedState {
    let workflow = StakworkClient::new(&config.stakwork.base_url, config.stakwork.api_key.clone());
    let pool = PoolManagerClient::new(
        &config.pool_manager.base_url,
        config.pool_manager.api_key.clone(),
    );
    let signer = UrlSigner::new(&config.storage.base_url, config.storage.signing_key.clone());
    Arc::new(AppState {
        db: DbHandle::new(db),
        workflow: Arc::new(workflow),
        pool: Arc::new(pool),
        gitsee: Arc::new(HttpGitSeeClient::new()),
        signer,
        config,
    })
}

pub async fn start_server(server: ServerConfig, config: HiveToml) -> Result<()> {
    if let Some(parent) = server.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = HiveDb::new(&server.db_path).context("Failed to initialize hive database")?;

    for warning in config.validate() {
        warn!("{warning}");
    }

    let mut app = build_router(build_state(db, config));
    if server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if server.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        db = %server.db_path.display(),
        dev = server.dev_mode,
        "Hive listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down");
        return;
    }
    info!("Shutting down...");
}
