//! Typed error hierarchy for Hive.
//!
//! `HiveError` names the domain failures handlers need to tell apart; the
//! HTTP layer maps each variant onto a status code in `server::api`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HiveError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Workspace not found")]
    WorkspaceNotFound,

    #[error("Task not found")]
    TaskNotFound,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{service} request failed: {message}")]
    Upstream { service: &'static str, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HiveError {
    pub fn upstream(service: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            service,
            message: err.to_string(),
        }
    }
}
