use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use tracing::error;

use super::{cron, gitsee, janitors, media, pool, prompts, workspaces};
use crate::clients::{ClientError, GitSeeClient, PoolClient, UrlSigner, WorkflowClient};
use crate::config::HiveToml;
use crate::db::DbHandle;
use crate::errors::HiveError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub config: HiveToml,
    pub workflow: Arc<dyn WorkflowClient>,
    pub pool: Arc<dyn PoolClient>,
    pub gitsee: Arc<dyn GitSeeClient>,
    pub signer: UrlSigner,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Upstream { status: StatusCode, message: String },
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("Access denied".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Upstream { status, message } => (status, message),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<HiveError> for ApiError {
    fn from(err: HiveError) -> Self {
        match err {
            HiveError::Unauthorized => ApiError::Unauthorized,
            HiveError::Forbidden => ApiError::forbidden(),
            HiveError::WorkspaceNotFound | HiveError::TaskNotFound | HiveError::NotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            HiveError::BadRequest(msg) => ApiError::BadRequest(msg),
            HiveError::Conflict(msg) => ApiError::Conflict(msg),
            HiveError::Upstream { .. } => ApiError::Upstream {
                status: StatusCode::BAD_GATEWAY,
                message: err.to_string(),
            },
            HiveError::Config(_) | HiveError::Database(_) | HiveError::Other(_) => {
                error!(error = %err, "Request failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %format!("{err:#}"), "Request failed");
        ApiError::Internal(err.to_string())
    }
}

/// Upstream 4xx responses keep their status; everything else is a 502.
impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        let status = err
            .client_status()
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        ApiError::Upstream {
            status,
            message: err.to_string(),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        // Cron
        .route("/api/cron/janitors", get(cron::janitor_sweep))
        .route("/api/cron/task-coordinator", get(cron::task_coordinator))
        // Workspaces & tasks
        .route("/api/workspaces", post(workspaces::create_workspace))
        .route(
            "/api/workspaces/{slug}",
            get(workspaces::get_workspace).delete(workspaces::delete_workspace),
        )
        .route("/api/workspaces/{slug}/members", post(workspaces::add_member))
        .route(
            "/api/workspaces/{slug}/tasks",
            get(workspaces::list_tasks).post(workspaces::create_task),
        )
        .route("/api/tasks/{task_id}", patch(workspaces::update_task))
        // Janitors
        .route(
            "/api/workspaces/{slug}/janitors/config",
            get(janitors::get_config).put(janitors::update_config),
        )
        .route(
            "/api/workspaces/{slug}/janitors/runs",
            get(janitors::list_runs),
        )
        .route(
            "/api/workspaces/{slug}/janitors/recommendations",
            get(janitors::list_recommendations),
        )
        .route(
            "/api/workspaces/{slug}/janitors/{janitor_type}/run",
            post(janitors::trigger_run),
        )
        .route(
            "/api/janitors/recommendations/{id}/accept",
            post(janitors::accept_recommendation),
        )
        .route(
            "/api/janitors/recommendations/{id}/dismiss",
            post(janitors::dismiss_recommendation),
        )
        .route("/api/janitors/webhook", post(janitors::webhook))
        // Media
        .route("/api/screenshots", get(media::list_screenshots))
        .route(
            "/api/tasks/{task_id}/artifacts/{artifact_id}/url",
            get(media::artifact_url),
        )
        // Pool manager
        .route(
            "/api/pool-manager/claim-pod/{workspace_id}",
            post(pool::claim_pod),
        )
        .route("/api/pool-manager/create-pool", post(pool::create_pool))
        .route("/api/pool-manager/delete-pool", delete(pool::delete_pool))
        .route("/api/w/{slug}/pool/status", get(pool::pool_status))
        // GitSee
        .route("/api/gitsee/trigger", post(gitsee::trigger))
        // Workflow prompts
        .route(
            "/api/workflow/prompts",
            get(prompts::list_prompts).post(prompts::create_prompt),
        )
        .route(
            "/api/workflow/prompts/{id}",
            get(prompts::get_prompt)
                .put(prompts::update_prompt)
                .delete(prompts::delete_prompt),
        )
}

async fn health_check() -> &'static str {
    "ok"
}

// ── Test support ──────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::clients::testing::{FakeGitSee, FakePool, FakeWorkflow};
    use crate::db::HiveDb;
    use crate::models::{User, Workspace, WorkspaceRole};
    use crate::server::auth::USER_HEADER;

    /// A router over an in-memory database with one workspace (`acme`),
    /// its owner, a developer member and a user outside the workspace.
    pub struct TestApp {
        pub state: SharedState,
        pub workflow: Arc<FakeWorkflow>,
        pub pool: Arc<FakePool>,
        pub gitsee: Arc<FakeGitSee>,
        pub owner: User,
        pub member: User,
        pub outsider: User,
        pub workspace: Workspace,
    }

    impl TestApp {
        pub fn new() -> Self {
            Self::with_config(HiveToml::default())
        }

        pub fn with_config(mut config: HiveToml) -> Self {
            config.stakwork.janitor_workflow_id.get_or_insert(11);
            config.stakwork.task_workflow_id.get_or_insert(22);

            let db = HiveDb::new_in_memory().unwrap();
            let owner = db.create_user("Owner", "owner@example.com").unwrap();
            let member = db.create_user("Dev", "dev@example.com").unwrap();
            let outsider = db.create_user("Outsider", "outsider@example.com").unwrap();
            let workspace = db
                .create_workspace("Acme", "acme", owner.id, Some("https://github.com/acme/app"))
                .unwrap();
            db.ensure_janitor_config(workspace.id).unwrap();
            db.add_member(workspace.id, member.id, WorkspaceRole::Developer)
                .unwrap();

            let workflow = Arc::new(FakeWorkflow::new());
            let pool = Arc::new(FakePool::with_unused_vms(3));
            let gitsee = Arc::new(FakeGitSee::new());
            let signer = UrlSigner::new("https://media.test", Some("test-key".into()));
            let state = Arc::new(AppState {
                db: DbHandle::new(db),
                config,
                workflow: workflow.clone(),
                pool: pool.clone(),
                gitsee: gitsee.clone(),
                signer,
            });
            Self {
                state,
                workflow,
                pool,
                gitsee,
                owner,
                member,
                outsider,
                workspace,
            }
        }

        pub fn router(&self) -> Router {
            api_router().with_state(self.state.clone())
        }

        /// Run a synchronous setup step against the database.
        pub fn seed<R>(&self, f: impl FnOnce(&HiveDb) -> anyhow::Result<R>) -> R {
            let guard = self.state.db.lock_sync().unwrap();
            f(&guard).unwrap()
        }

        pub async fn send(
            &self,
            method: &str,
            uri: &str,
            user: Option<&User>,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, serde_json::Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(user) = user {
                builder = builder.header(USER_HEADER, user.id.to_string());
            }
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            self.send_request(request).await
        }

        pub async fn send_request(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
            let response = self.router().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let json = if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes)
                    .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into()))
            };
            (status, json)
        }
    }
}
