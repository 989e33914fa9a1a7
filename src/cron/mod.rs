//! Scheduled sweeps driven by the cron endpoints and `hive cron`.
//!
//! A sweep never aborts on a per-item failure: it records a [`SweepError`]
//! and moves on. Only a failure that prevents the sweep from starting at all
//! (for example listing workspaces) is returned as `Err`.

pub mod coordinator;
pub mod janitor;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::JanitorType;

pub use coordinator::run_task_coordinator;
pub use janitor::run_janitor_sweep;

/// One per-item failure inside a sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub janitor_type: Option<JanitorType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation_id: Option<i64>,
    pub error: String,
}

impl SweepError {
    pub fn for_workspace(slug: &str, error: impl ToString) -> Self {
        Self {
            workspace_slug: Some(slug.to_string()),
            janitor_type: None,
            task_id: None,
            recommendation_id: None,
            error: error.to_string(),
        }
    }

    pub fn janitor(mut self, janitor_type: JanitorType) -> Self {
        self.janitor_type = Some(janitor_type);
        self
    }

    pub fn task(mut self, task_id: i64) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn recommendation(mut self, recommendation_id: i64) -> Self {
        self.recommendation_id = Some(recommendation_id);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JanitorSweepReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub workspaces_processed: usize,
    pub runs_created: usize,
    pub error_count: usize,
    pub errors: Vec<SweepError>,
    pub timestamp: DateTime<Utc>,
}

impl JanitorSweepReport {
    pub fn disabled() -> Self {
        Self {
            success: true,
            message: Some("Janitor cron is disabled".to_string()),
            workspaces_processed: 0,
            runs_created: 0,
            error_count: 0,
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn finish(workspaces_processed: usize, runs_created: usize, errors: Vec<SweepError>) -> Self {
        Self {
            success: errors.is_empty(),
            message: None,
            workspaces_processed,
            runs_created,
            error_count: errors.len(),
            errors,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub workspaces_processed: usize,
    pub tasks_created: usize,
    pub tasks_halted: usize,
    pub error_count: usize,
    pub errors: Vec<SweepError>,
    pub timestamp: DateTime<Utc>,
}

impl CoordinatorReport {
    pub fn disabled() -> Self {
        Self {
            success: true,
            message: Some("Task coordinator is disabled".to_string()),
            workspaces_processed: 0,
            tasks_created: 0,
            tasks_halted: 0,
            error_count: 0,
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}
