use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ClientError, ClientResult, check_status, decode_json, transport};

const SERVICE: &str = "Pool Manager";

/// VM counts for a pool as reported by the Pool Manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    #[serde(alias = "running_vms")]
    pub running_vms: u32,
    #[serde(alias = "pending_vms")]
    pub pending_vms: u32,
    #[serde(alias = "failed_vms")]
    pub failed_vms: u32,
    #[serde(alias = "used_vms")]
    pub used_vms: u32,
    #[serde(alias = "unused_vms")]
    pub unused_vms: u32,
    #[serde(default, alias = "last_check")]
    pub last_check: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PoolStatusEnvelope {
    status: PoolStatus,
}

/// A claimed pod. `port_mappings` maps container ports to public URLs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodWorkspace {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, alias = "port_mappings")]
    pub port_mappings: HashMap<String, String>,
}

impl PodWorkspace {
    /// URL of the app's frontend: the port-3000 mapping, else the pod URL.
    pub fn frontend_url(&self) -> &str {
        self.port_mappings
            .get("3000")
            .map(String::as_str)
            .unwrap_or(&self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatePoolRequest {
    pub pool_name: String,
    pub minimum_vms: u32,
    pub repo_name: String,
    pub branch_name: String,
    pub env_vars: Vec<EnvVar>,
}

/// Result of provisioning a pool: the key later used to query and claim it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedPool {
    pub pool_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[async_trait]
pub trait PoolClient: Send + Sync {
    async fn pool_status(&self, pool_name: &str, pool_api_key: &str) -> ClientResult<PoolStatus>;
    async fn claim_pod(&self, pool_name: &str, pool_api_key: &str) -> ClientResult<PodWorkspace>;
    async fn create_pool(&self, request: &CreatePoolRequest) -> ClientResult<CreatedPool>;
    async fn delete_pool(&self, pool_name: &str) -> ClientResult<()>;
}

/// HTTP client for the Pool Manager API.
#[derive(Clone)]
pub struct PoolManagerClient {
    http: reqwest::Client,
    base_url: String,
    /// Admin key for pool creation and deletion.
    api_key: Option<String>,
}

impl PoolManagerClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn admin_key(&self) -> ClientResult<&str> {
        self.api_key
            .as_deref()
            .ok_or(ClientError::NotConfigured("Pool Manager API key"))
    }

    fn pool_url(&self, pool_name: &str) -> String {
        format!("{}/pools/{}", self.base_url, pool_name)
    }
}

#[async_trait]
impl PoolClient for PoolManagerClient {
    async fn pool_status(&self, pool_name: &str, pool_api_key: &str) -> ClientResult<PoolStatus> {
        let resp = self
            .http
            .get(self.pool_url(pool_name))
            .bearer_auth(pool_api_key)
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        let envelope: PoolStatusEnvelope = decode_json(SERVICE, resp).await?;
        Ok(envelope.status)
    }

    async fn claim_pod(&self, pool_name: &str, pool_api_key: &str) -> ClientResult<PodWorkspace> {
        let resp = self
            .http
            .get(format!("{}/workspace", self.pool_url(pool_name)))
            .bearer_auth(pool_api_key)
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        decode_json(SERVICE, resp).await
    }

    async fn create_pool(&self, request: &CreatePoolRequest) -> ClientResult<CreatedPool> {
        let resp = self
            .http
            .post(format!("{}/pools", self.base_url))
            .bearer_auth(self.admin_key()?)
            .json(request)
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let resp = check_status(SERVICE, resp).await?;
        decode_json(SERVICE, resp).await
    }

    async fn delete_pool(&self, pool_name: &str) -> ClientResult<()> {
        let resp = self
            .http
            .delete(self.pool_url(pool_name))
            .bearer_auth(self.admin_key()?)
            .send()
            .await
            .map_err(transport(SERVICE))?;
        check_status(SERVICE, resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_status_accepts_snake_case() {
        let body = r#"{"status":{"running_vms":3,"pending_vms":0,"failed_vms":1,"used_vms":1,"unused_vms":2,"last_check":"2026-10-18T10:00:00Z"}}"#;
        let envelope: PoolStatusEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.status.unused_vms, 2);
        assert_eq!(envelope.status.failed_vms, 1);
    }

    #[test]
    fn test_pool_status_serializes_camel_case() {
        let status = PoolStatus {
            running_vms: 1,
            unused_vms: 1,
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["runningVms"], 1);
        assert_eq!(json["unusedVms"], 1);
    }

    #[test]
    fn test_frontend_url_prefers_port_3000() {
        let mut pod = PodWorkspace {
            id: "pod-1".into(),
            url: "https://pod-1.workspaces.test".into(),
            password: None,
            port_mappings: HashMap::new(),
        };
        assert_eq!(pod.frontend_url(), "https://pod-1.workspaces.test");
        pod.port_mappings
            .insert("3000".into(), "https://pod-1-3000.workspaces.test".into());
        assert_eq!(pod.frontend_url(), "https://pod-1-3000.workspaces.test");
    }

    #[test]
    fn test_admin_key_required() {
        let client = PoolManagerClient::new("https://pools.test/api/", None);
        assert!(matches!(client.admin_key(), Err(ClientError::NotConfigured(_))));
        assert_eq!(client.pool_url("acme"), "https://pools.test/api/pools/acme");
    }
}
