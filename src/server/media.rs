use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use super::api::{ApiError, SharedState};
use super::auth::{CurrentUser, member_of};
use crate::models::{ArtifactType, ScreenshotPage};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

/// Raw query string values; parsed by hand so bad input gets a JSON 400.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotQuery {
    pub workspace_id: Option<String>,
    pub task_id: Option<String>,
    pub limit: Option<String>,
    pub cursor: Option<String>,
}

fn parse_id(value: Option<&str>, name: &str) -> Result<Option<i64>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("Invalid {name}"))),
    }
}

/// Page size from `limit`: default 50, clamped to 1..=100.
fn page_size(limit: Option<&str>) -> Result<usize, ApiError> {
    let limit = parse_id(limit, "limit")?.unwrap_or(DEFAULT_PAGE_SIZE);
    Ok(limit.clamp(1, MAX_PAGE_SIZE) as usize)
}

pub async fn list_screenshots(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Query(query): Query<ScreenshotQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let workspace_id = parse_id(query.workspace_id.as_deref(), "workspaceId")?
        .ok_or_else(|| ApiError::bad_request("workspaceId is required"))?;
    let task_id = parse_id(query.task_id.as_deref(), "taskId")?;
    let cursor = parse_id(query.cursor.as_deref(), "cursor")?;
    let limit = page_size(query.limit.as_deref())?;

    let (workspace, _) = member_of(&state, workspace_id, &user).await?;

    if let Some(task_id) = task_id {
        let task = state.db.call(move |db| db.get_task(task_id)).await?;
        if task.is_none_or(|t| t.workspace_id != workspace.id) {
            return Err(ApiError::not_found("Task not found"));
        }
    }

    let now = Utc::now();
    let ttl = state.config.storage.screenshot_url_ttl_secs;
    let signer = state.signer.clone();
    let page = state
        .db
        .call(move |db| {
            let (mut screenshots, pagination) =
                db.list_screenshots(workspace.id, task_id, cursor, limit)?;
            for shot in screenshots.iter_mut().filter(|s| s.url_expired(now)) {
                let signed = signer.sign(&shot.object_key, ttl, now)?;
                db.update_screenshot_url(shot.id, &signed.url, signed.expires_at)?;
                shot.url = Some(signed.url);
                shot.url_expires_at = Some(signed.expires_at);
            }
            Ok(ScreenshotPage {
                screenshots,
                pagination,
            })
        })
        .await?;

    debug!(
        workspace_id,
        count = page.screenshots.len(),
        has_more = page.pagination.has_more,
        "Listed screenshots"
    );
    Ok(Json(page))
}

pub async fn artifact_url(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path((task_id, artifact_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let (task, artifact) = state
        .db
        .call(move |db| Ok((db.get_task(task_id)?, db.get_artifact(artifact_id)?)))
        .await?;
    let task = task.ok_or_else(|| ApiError::not_found("Task not found"))?;
    member_of(&state, task.workspace_id, &user).await?;

    let artifact = artifact
        .filter(|a| a.task_id == task.id)
        .ok_or_else(|| ApiError::not_found("Artifact not found"))?;

    if artifact.artifact_type != ArtifactType::Media {
        return Err(ApiError::bad_request("Artifact is not a media artifact"));
    }
    let key = artifact
        .object_key()
        .ok_or_else(|| ApiError::bad_request("Artifact has no media file"))?;

    let ttl = state.config.storage.artifact_url_ttl_secs;
    let signed = state.signer.sign(key, ttl, Utc::now())?;
    Ok(Json(serde_json::json!({
        "url": signed.url,
        "expiresIn": ttl,
    })))
}
