//! Stakwork prompt library, exposed to members of the workflow workspace.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::Value;

use super::api::{ApiError, SharedState};
use super::auth::CurrentUser;
use crate::models::User;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

/// Only members of the configured workflow workspace may use the prompt
/// library. A missing workspace is treated the same as no membership.
async fn require_workflow_member(state: &SharedState, user: &User) -> Result<(), ApiError> {
    let slug = state.config.workflow.workspace_slug.clone();
    let user_id = user.id;
    let role = state
        .db
        .call(move |db| match db.get_workspace_by_slug(&slug)? {
            Some(ws) => db.member_role(ws.id, user_id),
            None => Ok(None),
        })
        .await?;
    role.map(|_| ()).ok_or_else(ApiError::forbidden)
}

fn non_empty_field(body: &Value, field: &str) -> bool {
    body.get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

pub async fn list_prompts(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_workflow_member(&state, &user).await?;
    let page = query.page.unwrap_or(1).max(1);
    Ok(Json(state.workflow.list_prompts(page).await?))
}

pub async fn get_prompt(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_workflow_member(&state, &user).await?;
    Ok(Json(state.workflow.get_prompt(id).await?))
}

pub async fn create_prompt(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    require_workflow_member(&state, &user).await?;
    if !non_empty_field(&body, "name") || !non_empty_field(&body, "value") {
        return Err(ApiError::bad_request("name and value are required"));
    }
    let created = state.workflow.create_prompt(&body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_prompt(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    require_workflow_member(&state, &user).await?;
    Ok(Json(state.workflow.update_prompt(id, &body).await?))
}

pub async fn delete_prompt(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    require_workflow_member(&state, &user).await?;
    Ok(Json(state.workflow.delete_prompt(id).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::server::api::test_support::TestApp;

    /// Create the `stakwork` workspace and make the test member part of it.
    fn seed_workflow_workspace(app: &TestApp) {
        let (owner, member) = (app.owner.id, app.member.id);
        app.seed(|db| {
            let ws = db.create_workspace("Stakwork", "stakwork", owner, None)?;
            db.add_member(ws.id, member, crate::models::WorkspaceRole::Developer)?;
            Ok(())
        });
    }

    #[tokio::test]
    async fn test_prompts_require_workflow_membership() {
        let app = TestApp::new();
        let (status, _) = app
            .send("GET", "/api/workflow/prompts", Some(&app.member), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        seed_workflow_workspace(&app);
        let (status, _) = app
            .send("GET", "/api/workflow/prompts", Some(&app.outsider), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app.send("GET", "/api/workflow/prompts", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(app.workflow.prompt_calls().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_crud_passes_through() {
        let app = TestApp::new();
        seed_workflow_workspace(&app);

        let (status, body) = app
            .send("GET", "/api/workflow/prompts?page=2", Some(&app.member), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["page"], 2);

        let (status, body) = app
            .send("GET", "/api/workflow/prompts/7", Some(&app.member), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["id"], 7);

        let (status, body) = app
            .send(
                "POST",
                "/api/workflow/prompts",
                Some(&app.member),
                Some(json!({"name": "greet", "value": "Say hi"})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["name"], "greet");

        let (status, _) = app
            .send(
                "PUT",
                "/api/workflow/prompts/7",
                Some(&app.member),
                Some(json!({"value": "Say hello"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .send("DELETE", "/api/workflow/prompts/7", Some(&app.member), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(
            app.workflow.prompt_calls(),
            vec!["list:2", "get:7", "create", "update:7", "delete:7"]
        );
    }

    #[tokio::test]
    async fn test_create_prompt_requires_name_and_value() {
        let app = TestApp::new();
        seed_workflow_workspace(&app);
        for body in [json!({"name": "x"}), json!({"name": " ", "value": "v"}), json!({})] {
            let (status, _) = app
                .send("POST", "/api/workflow/prompts", Some(&app.member), Some(body))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert!(app.workflow.prompt_calls().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_upstream_errors() {
        let app = TestApp::new();
        seed_workflow_workspace(&app);

        app.workflow.fail_with(404, "no such prompt");
        let (status, body) = app
            .send("GET", "/api/workflow/prompts/99", Some(&app.member), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("no such prompt"));

        app.workflow.fail_with(500, "boom");
        let (status, _) = app
            .send("GET", "/api/workflow/prompts", Some(&app.member), None)
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
