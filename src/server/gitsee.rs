use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use tracing::info;

use super::api::{ApiError, SharedState};
use super::auth::{CurrentUser, member_of};
use crate::clients::gitsee::parse_github_repo;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub repository_url: Option<String>,
    pub workspace_id: Option<i64>,
}

/// Ask the workspace swarm's GitSee server to analyse a GitHub repository
/// and hand its JSON straight back.
pub async fn trigger(
    CurrentUser(user): CurrentUser,
    State(state): State<SharedState>,
    Json(req): Json<TriggerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(repository_url), Some(workspace_id)) = (
        req.repository_url.filter(|u| !u.trim().is_empty()),
        req.workspace_id,
    ) else {
        return Err(ApiError::bad_request(
            "repositoryUrl and workspaceId are required",
        ));
    };
    let (owner, repo) = parse_github_repo(&repository_url)
        .ok_or_else(|| ApiError::bad_request("Invalid GitHub repository URL"))?;

    member_of(&state, workspace_id, &user).await?;
    let swarm = state
        .db
        .call(move |db| db.get_swarm_by_workspace(workspace_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Swarm not found"))?;

    let data = state
        .gitsee
        .trigger(&swarm.swarm_url, &swarm.swarm_api_key, &owner, &repo)
        .await?;
    info!(workspace_id, %owner, %repo, "GitSee analysis triggered");
    Ok(Json(data))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::server::api::test_support::TestApp;

    fn seed_swarm(app: &TestApp) {
        let ws = app.workspace.id;
        app.seed(|db| db.create_swarm(ws, "acme-swarm", "https://acme.sphinx.chat", "swarm-key"));
    }

    #[tokio::test]
    async fn test_trigger_validates_input() {
        let app = TestApp::new();
        seed_swarm(&app);
        let ws = app.workspace.id;

        let cases = [
            json!({"workspaceId": ws}),
            json!({"repositoryUrl": "https://github.com/acme/app"}),
            json!({"repositoryUrl": "https://gitlab.com/acme/app", "workspaceId": ws}),
            json!({"repositoryUrl": "https://notgithub.com/acme/app", "workspaceId": ws}),
            json!({"repositoryUrl": "https://evil.test/github.com/acme/app", "workspaceId": ws}),
        ];
        for body in cases {
            let (status, _) = app
                .send("POST", "/api/gitsee/trigger", Some(&app.member), Some(body.clone()))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
        }
        assert!(app.gitsee.calls().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_requires_membership_and_swarm() {
        let app = TestApp::new();
        let body = json!({"repositoryUrl": "https://github.com/acme/app", "workspaceId": app.workspace.id});

        let (status, _) = app
            .send("POST", "/api/gitsee/trigger", Some(&app.member), Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        seed_swarm(&app);
        let (status, _) = app
            .send("POST", "/api/gitsee/trigger", Some(&app.outsider), Some(body))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_trigger_proxies_gitsee() {
        let app = TestApp::new();
        seed_swarm(&app);
        let body = json!({
            "repositoryUrl": "git@github.com:acme/app.git",
            "workspaceId": app.workspace.id,
        });

        let (status, resp) = app
            .send("POST", "/api/gitsee/trigger", Some(&app.member), Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["repo"]["owner"], "acme");
        assert_eq!(app.gitsee.calls(), vec![("acme".to_string(), "app".to_string())]);

        app.gitsee.set_failing(true);
        let (status, _) = app
            .send("POST", "/api/gitsee/trigger", Some(&app.member), Some(body))
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
