//! Request identity and access checks.
//!
//! Session handling lives in front of Hive; the proxy forwards the signed-in
//! user's id in `x-hive-user`. Cron routes authenticate with the shared
//! `CRON_SECRET` bearer token instead.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::api::{ApiError, SharedState};
use crate::clients::signer::constant_time_eq;
use crate::models::{User, Workspace, WorkspaceRole};

pub const USER_HEADER: &str = "x-hive-user";

/// The authenticated caller. Rejects with 401 when the header is missing,
/// malformed or names an unknown user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .ok_or(ApiError::Unauthorized)?;
        state
            .db
            .call(move |db| db.get_user(user_id))
            .await?
            .map(CurrentUser)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Caller presented the cron secret, or no secret is configured.
pub struct CronAuth;

impl FromRequestParts<SharedState> for CronAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.cron.secret.as_deref() else {
            return Ok(CronAuth);
        };
        let presented = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented.is_some_and(|p| constant_time_eq(p.as_bytes(), secret.as_bytes())) {
            Ok(CronAuth)
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}

/// Look up a workspace by id and the caller's role in it.
/// 404 for a missing or deleted workspace, 403 for a non-member.
pub async fn member_of(
    state: &SharedState,
    workspace_id: i64,
    user: &User,
) -> Result<(Workspace, WorkspaceRole), ApiError> {
    let user_id = user.id;
    let (workspace, role) = state
        .db
        .call(move |db| {
            let Some(workspace) = db.get_workspace(workspace_id)? else {
                return Ok((None, None));
            };
            let role = db.member_role(workspace.id, user_id)?;
            Ok((Some(workspace), role))
        })
        .await?;
    let workspace = workspace.ok_or_else(|| ApiError::not_found("Workspace not found"))?;
    let role = role.ok_or_else(ApiError::forbidden)?;
    Ok((workspace, role))
}

/// Same as [`member_of`], addressed by slug.
pub async fn member_of_slug(
    state: &SharedState,
    slug: &str,
    user: &User,
) -> Result<(Workspace, WorkspaceRole), ApiError> {
    let slug = slug.to_string();
    let workspace = state
        .db
        .call(move |db| db.get_workspace_by_slug(&slug))
        .await?
        .ok_or_else(|| ApiError::not_found("Workspace not found"))?;
    member_of(state, workspace.id, user).await
}

/// Membership with an owner or admin role.
pub async fn admin_of(
    state: &SharedState,
    workspace_id: i64,
    user: &User,
) -> Result<(Workspace, WorkspaceRole), ApiError> {
    let (workspace, role) = member_of(state, workspace_id, user).await?;
    if !role.is_admin() {
        return Err(ApiError::forbidden());
    }
    Ok((workspace, role))
}
