use std::sync::LazyLock;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use super::api::{ApiError, SharedState};
use super::auth::{CurrentUser, member_of, member_of_slug};
use crate::models::*;

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]{2,50}$").expect("slug pattern is valid"));

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceRequest {
    pub name: String,
    pub slug: String,
    pub repository_url: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub user_id: i64,
    pub role: WorkspaceRole,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: Option<Priority>,
    pub mode: Option<TaskMode>,
    #[serde(default)]
    pub depends_on: Vec<i64>,
    /// Hand the task to the coordinator's ticket sweep.
    #[serde(default)]
    pub assign_to_coordinator: bool,
}

// ── Workspaces ────────────────────────────────────────────────────────

pub async fn create_workspace(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("Workspace name is required"));
    }
    if !SLUG_RE.is_match(&req.slug) {
        return Err(ApiError::bad_request(
            "Slug must be 2-50 lowercase letters, digits or hyphens",
        ));
    }

    let slug = req.slug.clone();
    let repository_url = req.repository_url.filter(|u| !u.trim().is_empty());
    let owner_id = user.id;
    let workspace = state
        .db
        .call(move |db| {
            if db.slug_taken(&slug)? {
                return Ok(None);
            }
            let ws = db.create_workspace(&name, &slug, owner_id, repository_url.as_deref())?;
            db.ensure_janitor_config(ws.id)?;
            Ok(Some(ws))
        })
        .await?
        .ok_or_else(|| ApiError::Conflict("A workspace with this slug already exists".into()))?;

    info!(workspace = %workspace.slug, owner_id, "Workspace created");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "workspace": workspace })),
    ))
}

pub async fn get_workspace(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, role) = member_of_slug(&state, &slug, &user).await?;
    Ok(Json(serde_json::json!({ "workspace": workspace, "role": role })))
}

pub async fn delete_workspace(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, role) = member_of_slug(&state, &slug, &user).await?;
    if role != WorkspaceRole::Owner {
        return Err(ApiError::Forbidden(
            "Only the owner can delete a workspace".into(),
        ));
    }
    state
        .db
        .call(move |db| db.soft_delete_workspace(workspace.id))
        .await?;
    info!(workspace = %slug, "Workspace deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn add_member(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, role) = member_of_slug(&state, &slug, &user).await?;
    if !role.is_admin() {
        return Err(ApiError::forbidden());
    }
    if req.role == WorkspaceRole::Owner {
        return Err(ApiError::bad_request("Cannot assign the OWNER role"));
    }

    let member = state
        .db
        .call(move |db| {
            if db.get_user(req.user_id)?.is_none() {
                return Ok(None);
            }
            db.add_member(workspace.id, req.user_id, req.role).map(Some)
        })
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "member": member })),
    ))
}

// ── Tasks ─────────────────────────────────────────────────────────────

pub async fn create_task(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, _) = member_of_slug(&state, &slug, &user).await?;
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::bad_request("Task title is required"));
    }

    let new_task = NewTask {
        description: req.description,
        priority: req.priority.unwrap_or(Priority::Medium),
        mode: req.mode.unwrap_or(TaskMode::Live),
        depends_on: req.depends_on,
        system_assignee: req
            .assign_to_coordinator
            .then_some(SystemAssignee::TaskCoordinator),
        created_by_id: Some(user.id),
        ..NewTask::new(workspace.id, title)
    };
    let task = state.db.call(move |db| db.create_task(&new_task)).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "task": task })),
    ))
}

pub async fn list_tasks(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, _) = member_of_slug(&state, &slug, &user).await?;
    let tasks = state
        .db
        .call(move |db| db.list_tasks(workspace.id))
        .await?;
    Ok(Json(serde_json::json!({ "tasks": tasks })))
}

pub async fn update_task(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(task_id): Path<i64>,
    Json(update): Json<TaskUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .db
        .call(move |db| db.get_task(task_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;
    member_of(&state, task.workspace_id, &user).await?;
    if update.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::bad_request("Task title cannot be empty"));
    }

    let task = state
        .db
        .call(move |db| db.update_task(task_id, &update))
        .await?;
    Ok(Json(serde_json::json!({ "task": task })))
}
