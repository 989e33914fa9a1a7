//! SQLite persistence for Hive.
//!
//! `HiveDb` owns the connection and exposes one method per query; the
//! methods are grouped by entity in the submodules. `DbHandle` is the
//! async-facing wrapper the server and sweeps share.

mod janitor;
mod media;
mod tasks;
mod workspaces;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Async-safe handle to the database.
///
/// Wraps `HiveDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<HiveDb>>,
}

impl DbHandle {
    pub fn new(db: HiveDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&HiveDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup and tests.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, HiveDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct HiveDb {
    conn: Connection,
}

impl HiveDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Raw connection, for tests that need to break the schema.
    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workspaces (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    owner_id INTEGER NOT NULL REFERENCES users(id),
                    repository_url TEXT,
                    deleted INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workspace_members (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    role TEXT NOT NULL,
                    joined_at TEXT NOT NULL,
                    UNIQUE(workspace_id, user_id)
                );

                CREATE TABLE IF NOT EXISTS swarms (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workspace_id INTEGER NOT NULL UNIQUE REFERENCES workspaces(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    swarm_url TEXT NOT NULL,
                    swarm_api_key TEXT NOT NULL,
                    pool_name TEXT,
                    pool_api_key TEXT,
                    pool_state TEXT NOT NULL DEFAULT 'NOT_STARTED',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS janitor_configs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workspace_id INTEGER NOT NULL UNIQUE REFERENCES workspaces(id) ON DELETE CASCADE,
                    unit_tests_enabled INTEGER NOT NULL DEFAULT 0,
                    integration_tests_enabled INTEGER NOT NULL DEFAULT 0,
                    e2e_tests_enabled INTEGER NOT NULL DEFAULT 0,
                    security_review_enabled INTEGER NOT NULL DEFAULT 0,
                    recommendation_sweep_enabled INTEGER NOT NULL DEFAULT 0,
                    ticket_sweep_enabled INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS janitor_runs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    config_id INTEGER NOT NULL REFERENCES janitor_configs(id) ON DELETE CASCADE,
                    janitor_type TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'PENDING',
                    triggered_by TEXT NOT NULL,
                    stakwork_project_id INTEGER,
                    error TEXT,
                    created_at TEXT NOT NULL,
                    started_at TEXT,
                    completed_at TEXT
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'TODO',
                    priority TEXT NOT NULL DEFAULT 'MEDIUM',
                    workflow_status TEXT NOT NULL DEFAULT 'PENDING',
                    source_type TEXT NOT NULL DEFAULT 'USER',
                    mode TEXT NOT NULL DEFAULT 'live',
                    system_assignee TEXT,
                    depends_on TEXT NOT NULL DEFAULT '[]',
                    stakwork_project_id INTEGER,
                    created_by_id INTEGER REFERENCES users(id),
                    deleted INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    workflow_started_at TEXT
                );

                CREATE TABLE IF NOT EXISTS janitor_recommendations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    run_id INTEGER NOT NULL REFERENCES janitor_runs(id) ON DELETE CASCADE,
                    workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    priority TEXT NOT NULL DEFAULT 'MEDIUM',
                    impact TEXT,
                    status TEXT NOT NULL DEFAULT 'PENDING',
                    task_id INTEGER REFERENCES tasks(id),
                    accepted_by_id INTEGER REFERENCES users(id),
                    accepted_at TEXT,
                    dismissed_by_id INTEGER REFERENCES users(id),
                    dismissed_at TEXT,
                    dismiss_reason TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS screenshots (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
                    task_id INTEGER REFERENCES tasks(id) ON DELETE SET NULL,
                    object_key TEXT NOT NULL,
                    url TEXT,
                    url_expires_at TEXT,
                    page_url TEXT NOT NULL,
                    action_index INTEGER NOT NULL DEFAULT 0,
                    hash TEXT NOT NULL,
                    width INTEGER,
                    height INTEGER,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS artifacts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    artifact_type TEXT NOT NULL,
                    content TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_members_user ON workspace_members(user_id);
                CREATE INDEX IF NOT EXISTS idx_runs_config_type ON janitor_runs(config_id, janitor_type, status);
                CREATE INDEX IF NOT EXISTS idx_runs_project ON janitor_runs(stakwork_project_id);
                CREATE INDEX IF NOT EXISTS idx_recommendations_ws ON janitor_recommendations(workspace_id, status);
                CREATE INDEX IF NOT EXISTS idx_tasks_ws_status ON tasks(workspace_id, status);
                CREATE INDEX IF NOT EXISTS idx_tasks_workflow ON tasks(workflow_status, mode);
                CREATE INDEX IF NOT EXISTS idx_screenshots_ws ON screenshots(workspace_id, id);
                CREATE INDEX IF NOT EXISTS idx_artifacts_task ON artifacts(task_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }
}

/// Map a JSON decode failure onto rusqlite's conversion error for column `idx`.
fn json_column_error(idx: usize, err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}
