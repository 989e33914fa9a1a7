//! In-process client fakes for tests.
//!
//! Each fake records the calls it receives and can be switched into a
//! failing mode to exercise error paths without a network.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{
    ClientError, ClientResult, CreatePoolRequest, CreatedPool, GitSeeClient, PodWorkspace,
    PoolClient, PoolStatus, WorkflowClient, WorkflowRequest,
};

fn failure(service: &'static str, status: u16, body: &str) -> ClientError {
    ClientError::Status {
        service,
        status,
        body: body.to_string(),
    }
}

/// Fake Stakwork. Project ids count up from 1000.
pub struct FakeWorkflow {
    requests: Mutex<Vec<WorkflowRequest>>,
    prompt_calls: Mutex<Vec<String>>,
    failure: Mutex<Option<(u16, String)>>,
}

impl FakeWorkflow {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            prompt_calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Make every subsequent call fail with `status`.
    pub fn fail_with(&self, status: u16, body: &str) {
        *self.failure.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<WorkflowRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn prompt_calls(&self) -> Vec<String> {
        self.prompt_calls.lock().unwrap().clone()
    }

    fn check(&self) -> ClientResult<()> {
        match &*self.failure.lock().unwrap() {
            Some((status, body)) => Err(failure("Stakwork", *status, body)),
            None => Ok(()),
        }
    }

    fn record_prompt(&self, call: String) -> ClientResult<()> {
        self.prompt_calls.lock().unwrap().push(call);
        self.check()
    }
}

#[async_trait]
impl WorkflowClient for FakeWorkflow {
    async fn create_project(&self, request: &WorkflowRequest) -> ClientResult<i64> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let id = 1000 + requests.len() as i64;
        drop(requests);
        self.check()?;
        Ok(id)
    }

    async fn list_prompts(&self, page: u32) -> ClientResult<Value> {
        self.record_prompt(format!("list:{page}"))?;
        Ok(json!({"success": true, "data": {"prompts": [], "page": page}}))
    }

    async fn get_prompt(&self, id: i64) -> ClientResult<Value> {
        self.record_prompt(format!("get:{id}"))?;
        Ok(json!({"success": true, "data": {"id": id, "name": "prompt", "value": "text"}}))
    }

    async fn create_prompt(&self, body: &Value) -> ClientResult<Value> {
        self.record_prompt("create".to_string())?;
        Ok(json!({"success": true, "data": body}))
    }

    async fn update_prompt(&self, id: i64, body: &Value) -> ClientResult<Value> {
        self.record_prompt(format!("update:{id}"))?;
        Ok(json!({"success": true, "data": {"id": id, "update": body}}))
    }

    async fn delete_prompt(&self, id: i64) -> ClientResult<Value> {
        self.record_prompt(format!("delete:{id}"))?;
        Ok(json!({"success": true}))
    }
}

/// Fake Pool Manager reporting a fixed `PoolStatus`.
pub struct FakePool {
    status: Mutex<PoolStatus>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<bool>,
}

impl FakePool {
    pub fn with_unused_vms(unused_vms: u32) -> Self {
        Self {
            status: Mutex::new(PoolStatus {
                running_vms: unused_vms,
                unused_vms,
                ..Default::default()
            }),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> ClientResult<()> {
        self.calls.lock().unwrap().push(call);
        if *self.failing.lock().unwrap() {
            return Err(failure("Pool Manager", 503, "pool manager unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl PoolClient for FakePool {
    async fn pool_status(&self, pool_name: &str, _pool_api_key: &str) -> ClientResult<PoolStatus> {
        self.record(format!("status:{pool_name}"))?;
        Ok(self.status.lock().unwrap().clone())
    }

    async fn claim_pod(&self, pool_name: &str, _pool_api_key: &str) -> ClientResult<PodWorkspace> {
        self.record(format!("claim:{pool_name}"))?;
        Ok(PodWorkspace {
            id: "pod-1".to_string(),
            url: "https://pod-1.workspaces.test".to_string(),
            password: Some("secret".to_string()),
            port_mappings: HashMap::from([(
                "3000".to_string(),
                "https://pod-1-3000.workspaces.test".to_string(),
            )]),
        })
    }

    async fn create_pool(&self, request: &CreatePoolRequest) -> ClientResult<CreatedPool> {
        self.record(format!("create:{}", request.pool_name))?;
        Ok(CreatedPool {
            pool_name: request.pool_name.clone(),
            api_key: Some("pool-key".to_string()),
        })
    }

    async fn delete_pool(&self, pool_name: &str) -> ClientResult<()> {
        self.record(format!("delete:{pool_name}"))
    }
}

/// Fake GitSee returning a canned repository summary.
pub struct FakeGitSee {
    calls: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
}

impl FakeGitSee {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitSeeClient for FakeGitSee {
    async fn trigger(
        &self,
        _swarm_url: &str,
        _swarm_api_key: &str,
        owner: &str,
        repo: &str,
    ) -> ClientResult<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((owner.to_string(), repo.to_string()));
        if *self.failing.lock().unwrap() {
            return Err(failure("GitSee", 500, "gitsee crashed"));
        }
        Ok(json!({"repo": {"owner": owner, "name": repo}, "contributors": []}))
    }
}
