use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::error;

use super::api::SharedState;
use super::auth::CronAuth;
use crate::cron;

/// Sweep failures that stop the whole run render as 500 with
/// `{success: false, error, timestamp}`.
fn sweep_failed(err: anyhow::Error) -> Response {
    error!(error = %format!("{err:#}"), "Cron sweep failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "timestamp": Utc::now(),
        })),
    )
        .into_response()
}

pub async fn janitor_sweep(_auth: CronAuth, State(state): State<SharedState>) -> Response {
    match cron::run_janitor_sweep(&state.db, &state.config, state.workflow.as_ref()).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => sweep_failed(e),
    }
}

pub async fn task_coordinator(_auth: CronAuth, State(state): State<SharedState>) -> Response {
    match cron::run_task_coordinator(
        &state.db,
        &state.config,
        state.workflow.as_ref(),
        state.pool.as_ref(),
    )
    .await
    {
        Ok(report) => Json(report).into_response(),
        Err(e) => sweep_failed(e),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::config::HiveToml;
    use crate::models::*;
    use crate::server::api::test_support::TestApp;

    fn enabled() -> HiveToml {
        let mut config = HiveToml::default();
        config.cron.janitor_enabled = true;
        config.cron.task_coordinator_enabled = true;
        config
    }

    #[tokio::test]
    async fn test_janitor_cron_disabled_response() {
        let app = TestApp::new();
        let (status, body) = app.send("GET", "/api/cron/janitors", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Janitor cron is disabled");
        assert_eq!(body["workspacesProcessed"], 0);
        assert_eq!(body["runsCreated"], 0);
        assert_eq!(body["errorCount"], 0);
        assert!(app.workflow.requests().is_empty());
    }

    #[tokio::test]
    async fn test_janitor_cron_creates_runs() {
        let app = TestApp::with_config(enabled());
        let ws = app.workspace.id;
        app.seed(|db| {
            db.update_janitor_config(
                ws,
                &JanitorSettings {
                    integration_tests_enabled: true,
                    ..Default::default()
                },
            )
        });

        let (status, body) = app.send("GET", "/api/cron/janitors", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["workspacesProcessed"], 1);
        assert_eq!(body["runsCreated"], 1);
        assert_eq!(body["errors"].as_array().unwrap().len(), 0);
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn test_janitor_cron_reports_errors() {
        let app = TestApp::with_config(enabled());
        let ws = app.workspace.id;
        app.seed(|db| {
            db.update_janitor_config(
                ws,
                &JanitorSettings {
                    unit_tests_enabled: true,
                    ..Default::default()
                },
            )
        });
        app.workflow.fail_with(500, "down");

        let (status, body) = app.send("GET", "/api/cron/janitors", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["errorCount"], 1);
        assert_eq!(body["errors"][0]["workspaceSlug"], "acme");
        assert_eq!(body["errors"][0]["janitorType"], "UNIT_TESTS");
    }

    #[tokio::test]
    async fn test_task_coordinator_reports_halted_tasks() {
        let app = TestApp::with_config(enabled());
        let (status, body) = app.send("GET", "/api/cron/task-coordinator", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["tasksHalted"], 0);
        assert_eq!(body["tasksCreated"], 0);
    }
}
