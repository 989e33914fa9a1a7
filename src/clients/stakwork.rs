use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ClientError, ClientResult, check_status, decode_json, transport};

const SERVICE: &str = "Stakwork";

/// A workflow run to create in Stakwork.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowRequest {
    pub name: String,
    pub workflow_id: i64,
    /// Exposed to the workflow as `set_var.attributes.vars`.
    pub vars: Value,
}

#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Start a workflow run and return Stakwork's project id.
    async fn create_project(&self, request: &WorkflowRequest) -> ClientResult<i64>;

    async fn list_prompts(&self, page: u32) -> ClientResult<Value>;
    async fn get_prompt(&self, id: i64) -> ClientResult<Value>;
    async fn create_prompt(&self, body: &Value) -> ClientResult<Value>;
    async fn update_prompt(&self, id: i64, body: &Value) -> ClientResult<Value>;
    async fn delete_prompt(&self, id: i64) -> ClientResult<Value>;
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    #[serde(default)]
    success: bool,
    data: Option<ProjectData>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectData {
    project_id: i64,
}

/// HTTP client for the Stakwork API.
#[derive(Clone)]
pub struct StakworkClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl StakworkClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn auth_header(&self) -> ClientResult<String> {
        self.api_key
            .as_deref()
            .map(|key| format!("Token token={}", key))
            .ok_or(ClientError::NotConfigured("Stakwork API key"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json(&self, req: reqwest::RequestBuilder) -> ClientResult<Value> {
        let resp = req
            .header("Authorization", self.auth_header()?)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        decode_json(SERVICE, resp).await
    }
}

#[async_trait]
impl WorkflowClient for StakworkClient {
    async fn create_project(&self, request: &WorkflowRequest) -> ClientResult<i64> {
        let body = serde_json::json!({
            "name": request.name,
            "workflow_id": request.workflow_id,
            "workflow_params": {
                "set_var": {
                    "attributes": {
                        "vars": request.vars,
                    }
                }
            }
        });
        let resp = self
            .http
            .post(self.url("/projects"))
            .header("Authorization", self.auth_header()?)
            .json(&body)
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        let parsed: ProjectResponse = decode_json(SERVICE, resp).await?;
        match parsed.data {
            Some(data) if parsed.success => Ok(data.project_id),
            _ => Err(ClientError::Decode {
                service: SERVICE,
                message: parsed
                    .error
                    .unwrap_or_else(|| "response did not include a project id".to_string()),
            }),
        }
    }

    async fn list_prompts(&self, page: u32) -> ClientResult<Value> {
        let req = self
            .http
            .get(self.url("/prompts"))
            .query(&[("page", page)]);
        self.send_json(req).await
    }

    async fn get_prompt(&self, id: i64) -> ClientResult<Value> {
        let req = self.http.get(self.url(&format!("/prompts/{}", id)));
        self.send_json(req).await
    }

    async fn create_prompt(&self, body: &Value) -> ClientResult<Value> {
        let req = self.http.post(self.url("/prompts")).json(body);
        self.send_json(req).await
    }

    async fn update_prompt(&self, id: i64, body: &Value) -> ClientResult<Value> {
        let req = self
            .http
            .put(self.url(&format!("/prompts/{}", id)))
            .json(body);
        self.send_json(req).await
    }

    async fn delete_prompt(&self, id: i64) -> ClientResult<Value> {
        let req = self.http.delete(self.url(&format!("/prompts/{}", id)));
        self.send_json(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_not_configured() {
        let client = StakworkClient::new("https://stakwork.test/api/v1/", None);
        assert!(matches!(
            client.auth_header(),
            Err(ClientError::NotConfigured(_))
        ));
        assert_eq!(client.url("/projects"), "https://stakwork.test/api/v1/projects");
    }

    #[test]
    fn test_auth_header_format() {
        let client = StakworkClient::new("https://stakwork.test", Some("abc".into()));
        assert_eq!(client.auth_header().unwrap(), "Token token=abc");
    }

    #[test]
    fn test_project_response_parsing() {
        let ok: ProjectResponse =
            serde_json::from_str(r#"{"success":true,"data":{"project_id":123}}"#).unwrap();
        assert!(ok.success);
        assert_eq!(ok.data.unwrap().project_id, 123);

        let failed: ProjectResponse =
            serde_json::from_str(r#"{"success":false,"error":"bad workflow"}"#).unwrap();
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("bad workflow"));
    }
}
