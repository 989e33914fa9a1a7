use std::str::FromStr;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::api::{ApiError, SharedState};
use super::auth::{CronAuth, CurrentUser, member_of, member_of_slug};
use crate::models::*;
use crate::workflows;

// ── Request payload types ─────────────────────────────────────────────

/// Partial janitor settings; omitted fields keep their current value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JanitorConfigUpdate {
    pub unit_tests_enabled: Option<bool>,
    pub integration_tests_enabled: Option<bool>,
    pub e2e_tests_enabled: Option<bool>,
    pub security_review_enabled: Option<bool>,
    pub recommendation_sweep_enabled: Option<bool>,
    pub ticket_sweep_enabled: Option<bool>,
}

impl JanitorConfigUpdate {
    fn apply(self, mut settings: JanitorSettings) -> JanitorSettings {
        let fields = [
            (self.unit_tests_enabled, &mut settings.unit_tests_enabled),
            (self.integration_tests_enabled, &mut settings.integration_tests_enabled),
            (self.e2e_tests_enabled, &mut settings.e2e_tests_enabled),
            (self.security_review_enabled, &mut settings.security_review_enabled),
            (self.recommendation_sweep_enabled, &mut settings.recommendation_sweep_enabled),
            (self.ticket_sweep_enabled, &mut settings.ticket_sweep_enabled),
        ];
        for (value, slot) in fields {
            if let Some(v) = value {
                *slot = v;
            }
        }
        settings
    }
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DismissRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub project_id: i64,
    pub status: String,
    pub error: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<NewRecommendation>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptResponse {
    recommendation: JanitorRecommendation,
    task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow_error: Option<String>,
}

// ── Configuration ─────────────────────────────────────────────────────

pub async fn get_config(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, _) = member_of_slug(&state, &slug, &user).await?;
    let config = state
        .db
        .call(move |db| db.ensure_janitor_config(workspace.id))
        .await?;
    Ok(Json(serde_json::json!({ "config": config })))
}

pub async fn update_config(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Json(update): Json<JanitorConfigUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, role) = member_of_slug(&state, &slug, &user).await?;
    if !role.is_admin() {
        return Err(ApiError::forbidden());
    }
    let config = state
        .db
        .call(move |db| {
            let current = db.ensure_janitor_config(workspace.id)?;
            db.update_janitor_config(workspace.id, &update.apply(current.settings))
        })
        .await?;
    info!(workspace = %slug, user_id = user.id, "Janitor config updated");
    Ok(Json(serde_json::json!({ "config": config })))
}

// ── Runs ──────────────────────────────────────────────────────────────

pub async fn trigger_run(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path((slug, janitor_type)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let janitor_type = JanitorType::from_str(&janitor_type.to_uppercase())
        .map_err(ApiError::BadRequest)?;
    let (workspace, role) = member_of_slug(&state, &slug, &user).await?;
    if !role.is_admin() {
        return Err(ApiError::forbidden());
    }

    let workspace_id = workspace.id;
    let config = state
        .db
        .call(move |db| db.ensure_janitor_config(workspace_id))
        .await?;
    if !config.settings.is_enabled(janitor_type) {
        return Err(ApiError::bad_request(format!(
            "{} janitor is not enabled",
            janitor_type
        )));
    }

    let run = workflows::start_janitor_run(
        &state.db,
        &state.config,
        state.workflow.as_ref(),
        &workspace,
        config.id,
        janitor_type,
        JanitorTrigger::Manual,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "run": run }))))
}

pub async fn list_runs(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Query(query): Query<RunsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, _) = member_of_slug(&state, &slug, &user).await?;
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let runs = state
        .db
        .call(move |db| db.list_janitor_runs(workspace.id, limit))
        .await?;
    Ok(Json(serde_json::json!({ "runs": runs })))
}

// ── Recommendations ───────────────────────────────────────────────────

pub async fn list_recommendations(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Query(query): Query<RecommendationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| RecommendationStatus::from_str(&s.to_uppercase()))
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let (workspace, _) = member_of_slug(&state, &slug, &user).await?;
    let recommendations = state
        .db
        .call(move |db| db.list_recommendations(workspace.id, status))
        .await?;
    Ok(Json(serde_json::json!({ "recommendations": recommendations })))
}

async fn load_recommendation(
    state: &SharedState,
    id: i64,
    user: &User,
) -> Result<JanitorRecommendation, ApiError> {
    let rec = state
        .db
        .call(move |db| db.get_recommendation(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Recommendation not found"))?;
    member_of(state, rec.workspace_id, user).await?;
    Ok(rec)
}

pub async fn accept_recommendation(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    load_recommendation(&state, id, &user).await?;
    let accepted = workflows::accept_recommendation(
        &state.db,
        &state.config,
        state.workflow.as_ref(),
        id,
        Some(user.id),
    )
    .await?;
    info!(recommendation_id = id, task_id = accepted.task.id, "Recommendation accepted");
    Ok((
        StatusCode::CREATED,
        Json(AcceptResponse {
            recommendation: accepted.recommendation,
            task: accepted.task,
            workflow_error: accepted.workflow_error.map(|e| e.to_string()),
        }),
    ))
}

pub async fn dismiss_recommendation(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: DismissRequest = if body.is_empty() {
        DismissRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?
    };
    let rec = load_recommendation(&state, id, &user).await?;
    if rec.status != RecommendationStatus::Pending {
        return Err(ApiError::Conflict(format!(
            "Recommendation is already {}",
            rec.status
        )));
    }
    let reason = request.reason;
    let user_id = user.id;
    let recommendation = state
        .db
        .call(move |db| db.dismiss_recommendation(id, user_id, reason.as_deref()))
        .await?;
    Ok(Json(serde_json::json!({ "recommendation": recommendation })))
}

// ── Webhook ───────────────────────────────────────────────────────────

/// Stakwork reports a finished janitor run, with its findings.
pub async fn webhook(
    _auth: CronAuth,
    State(state): State<SharedState>,
    Json(payload): Json<WebhookPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let status = JanitorRunStatus::from_str(&payload.status.to_uppercase())
        .map_err(ApiError::BadRequest)?;
    if !matches!(status, JanitorRunStatus::Completed | JanitorRunStatus::Failed) {
        return Err(ApiError::bad_request(format!(
            "Unsupported run status: {}",
            payload.status
        )));
    }

    let project_id = payload.project_id;
    let (outcome, created) = if status == JanitorRunStatus::Failed {
        let error = payload
            .error
            .unwrap_or_else(|| "Janitor run failed".to_string());
        (JanitorRunOutcome::Failed(error), 0)
    } else {
        let created = payload.recommendations.len();
        (JanitorRunOutcome::Completed(payload.recommendations), created)
    };

    let (found, finished) = state
        .db
        .call(move |db| {
            let Some(run) = db.find_janitor_run_by_project(project_id)? else {
                return Ok(None);
            };
            let finished = db.finish_janitor_run(run.id, &outcome)?;
            Ok(Some((run, finished)))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Janitor run not found"))?;
    let Some(run) = finished else {
        return Err(ApiError::Conflict(format!(
            "Janitor run is already {}",
            found.status
        )));
    };

    info!(
        run_id = run.id,
        project_id,
        status = %run.status,
        recommendations = created,
        "Janitor webhook processed"
    );
    Ok(Json(serde_json::json!({
        "success": true,
        "runId": run.id,
        "status": run.status,
        "recommendationsCreated": created,
    })))
}
