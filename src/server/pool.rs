//! Pool Manager proxy: claim pods, provision and tear down a workspace's
//! VM pool, and report its capacity.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::api::{ApiError, SharedState};
use super::auth::{CurrentUser, admin_of, member_of, member_of_slug};
use crate::clients::{CreatePoolRequest, EnvVar};
use crate::models::{PoolState, Swarm};

const DEFAULT_MINIMUM_VMS: u32 = 2;
const DEFAULT_BRANCH: &str = "main";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePoolBody {
    pub workspace_id: i64,
    pub minimum_vms: Option<u32>,
    pub branch_name: Option<String>,
    #[serde(default)]
    pub env_vars: Vec<EnvVar>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePoolBody {
    pub workspace_id: i64,
}

async fn swarm_for(state: &SharedState, workspace_id: i64) -> Result<Option<Swarm>, ApiError> {
    Ok(state
        .db
        .call(move |db| db.get_swarm_by_workspace(workspace_id))
        .await?)
}

/// The swarm's pool name and key, or 404 when no pool has been provisioned.
fn pool_credentials(swarm: Option<Swarm>) -> Result<(String, String), ApiError> {
    swarm
        .and_then(|s| s.pool_name.zip(s.pool_api_key))
        .ok_or_else(|| ApiError::not_found("Pool not configured"))
}

pub async fn claim_pod(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(workspace_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    member_of(&state, workspace_id, &user).await?;
    let (pool_name, pool_key) = pool_credentials(swarm_for(&state, workspace_id).await?)?;

    let pod = state.pool.claim_pod(&pool_name, &pool_key).await?;
    info!(workspace_id, pool = %pool_name, pod = %pod.id, "Claimed pod");
    Ok(Json(serde_json::json!({
        "success": true,
        "podId": pod.id,
        "frontend": pod.frontend_url(),
        "url": pod.url,
        "password": pod.password,
        "portMappings": pod.port_mappings,
    })))
}

pub async fn create_pool(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Json(body): Json<CreatePoolBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, _) = admin_of(&state, body.workspace_id, &user).await?;
    let swarm = swarm_for(&state, workspace.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Swarm not found"))?;
    let repo_name = workspace
        .repository_url
        .clone()
        .ok_or_else(|| ApiError::bad_request("Workspace has no repository"))?;

    let request = CreatePoolRequest {
        pool_name: swarm.name.clone(),
        minimum_vms: body.minimum_vms.unwrap_or(DEFAULT_MINIMUM_VMS),
        repo_name,
        branch_name: body
            .branch_name
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        env_vars: body.env_vars,
    };

    let ws_id = workspace.id;
    state
        .db
        .call(move |db| db.update_pool_state(ws_id, PoolState::Started))
        .await?;

    match state.pool.create_pool(&request).await {
        Ok(created) => {
            let swarm = state
                .db
                .call(move |db| {
                    db.set_swarm_pool(
                        ws_id,
                        Some(&created.pool_name),
                        created.api_key.as_deref(),
                        PoolState::Complete,
                    )
                })
                .await?;
            info!(workspace = %workspace.slug, pool = %request.pool_name, "Pool created");
            Ok((
                StatusCode::CREATED,
                Json(serde_json::json!({ "success": true, "swarm": swarm })),
            ))
        }
        Err(e) => {
            warn!(workspace = %workspace.slug, error = %e, "Pool creation failed");
            state
                .db
                .call(move |db| db.update_pool_state(ws_id, PoolState::Failed))
                .await?;
            Err(e.into())
        }
    }
}

pub async fn delete_pool(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Json(body): Json<DeletePoolBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, _) = admin_of(&state, body.workspace_id, &user).await?;
    let swarm = swarm_for(&state, workspace.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Swarm not found"))?;

    if let Some(pool_name) = swarm.pool_name.as_deref() {
        state.pool.delete_pool(pool_name).await?;
    }
    let ws_id = workspace.id;
    state
        .db
        .call(move |db| db.set_swarm_pool(ws_id, None, None, PoolState::NotStarted))
        .await?;
    info!(workspace = %workspace.slug, "Pool deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn pool_status(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (workspace, _) = member_of_slug(&state, &slug, &user).await?;
    let (pool_name, pool_key) = pool_credentials(swarm_for(&state, workspace.id).await?)?;
    let status = state.pool.pool_status(&pool_name, &pool_key).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "data": { "status": status },
    })))
}
