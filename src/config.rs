//! Configuration for Hive, read from `hive.toml`.
//!
//! Settings are layered file → environment → CLI. A missing file yields the
//! defaults below; environment variables override individual keys.
//!
//! ```toml
//! [server]
//! port = 3000
//! public_url = "https://hive.example.com"
//!
//! [database]
//! path = ".hive/hive.db"
//!
//! [cron]
//! janitor_enabled = true
//! task_coordinator_enabled = true
//! secret = "..."
//!
//! [stakwork]
//! base_url = "https://api.stakwork.com/api/v1"
//! api_key = "..."
//! janitor_workflow_id = 123
//! task_workflow_id = 456
//!
//! [pool_manager]
//! base_url = "https://workspaces.sphinx.chat/api"
//! api_key = "..."
//!
//! [storage]
//! base_url = "https://media.example.com"
//! signing_key = "..."
//!
//! [coordinator]
//! min_unused_vms = 2
//! max_items_per_workspace = 1
//! stale_agent_task_hours = 24
//!
//! [workflow]
//! workspace_slug = "stakwork"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used to build webhook callbacks.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            public_url: None,
        }
    }
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".hive/hive.db")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronSection {
    #[serde(default)]
    pub janitor_enabled: bool,
    #[serde(default)]
    pub task_coordinator_enabled: bool,
    /// Bearer token the scheduler must present on cron and webhook routes.
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakworkSection {
    #[serde(default = "default_stakwork_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub janitor_workflow_id: Option<i64>,
    #[serde(default)]
    pub task_workflow_id: Option<i64>,
}

impl Default for StakworkSection {
    fn default() -> Self {
        Self {
            base_url: default_stakwork_url(),
            api_key: None,
            janitor_workflow_id: None,
            task_workflow_id: None,
        }
    }
}

fn default_stakwork_url() -> String {
    "https://api.stakwork.com/api/v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolManagerSection {
    #[serde(default = "default_pool_manager_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for PoolManagerSection {
    fn default() -> Self {
        Self {
            base_url: default_pool_manager_url(),
            api_key: None,
        }
    }
}

fn default_pool_manager_url() -> String {
    "https://workspaces.sphinx.chat/api".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_storage_url")]
    pub base_url: String,
    #[serde(default)]
    pub signing_key: Option<String>,
    #[serde(default = "default_screenshot_ttl")]
    pub screenshot_url_ttl_secs: i64,
    #[serde(default = "default_artifact_ttl")]
    pub artifact_url_ttl_secs: i64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            base_url: default_storage_url(),
            signing_key: None,
            screenshot_url_ttl_secs: default_screenshot_ttl(),
            artifact_url_ttl_secs: default_artifact_ttl(),
        }
    }
}

fn default_storage_url() -> String {
    "http://localhost:3000/media".to_string()
}

fn default_screenshot_ttl() -> i64 {
    7 * 24 * 60 * 60
}

fn default_artifact_ttl() -> i64 {
    60 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSection {
    #[serde(default = "default_min_unused_vms")]
    pub min_unused_vms: u32,
    #[serde(default = "default_max_items")]
    pub max_items_per_workspace: u32,
    #[serde(default = "default_stale_hours")]
    pub stale_agent_task_hours: i64,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            min_unused_vms: default_min_unused_vms(),
            max_items_per_workspace: default_max_items(),
            stale_agent_task_hours: default_stale_hours(),
        }
    }
}

fn default_min_unused_vms() -> u32 {
    2
}

fn default_max_items() -> u32 {
    1
}

fn default_stale_hours() -> i64 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSection {
    /// Members of this workspace may manage the shared prompt library.
    #[serde(default = "default_workflow_slug")]
    pub workspace_slug: String,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            workspace_slug: default_workflow_slug(),
        }
    }
}

fn default_workflow_slug() -> String {
    "stakwork".to_string()
}

/// The complete hive.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HiveToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub cron: CronSection,
    #[serde(default)]
    pub stakwork: StakworkSection,
    #[serde(default)]
    pub pool_manager: PoolManagerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub coordinator: CoordinatorSection,
    #[serde(default)]
    pub workflow: WorkflowSection,
}

impl HiveToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse hive.toml")?;
        config.check_durations()?;
        Ok(config)
    }

    /// Reject durations the sweeps and the URL signer cannot use.
    pub fn check_durations(&self) -> Result<()> {
        let hours = self.coordinator.stale_agent_task_hours;
        if TimeDelta::try_hours(hours).is_none_or(|d| d <= TimeDelta::zero()) {
            bail!("coordinator.stale_agent_task_hours must be a positive number of hours, got {hours}");
        }
        for (name, secs) in [
            ("storage.screenshot_url_ttl_secs", self.storage.screenshot_url_ttl_secs),
            ("storage.artifact_url_ttl_secs", self.storage.artifact_url_ttl_secs),
        ] {
            if TimeDelta::try_seconds(secs).is_none_or(|d| d <= TimeDelta::zero()) {
                bail!("{name} must be a positive number of seconds, got {secs}");
            }
        }
        Ok(())
    }

    /// Load from `path`, or return defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize hive.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Boolean flags are on only for the literal `true`, so a stray value can
    /// never switch a sweep on.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("JANITOR_CRON_ENABLED") {
            self.cron.janitor_enabled = v == "true";
        }
        if let Some(v) = lookup("TASK_COORDINATOR_ENABLED") {
            self.cron.task_coordinator_enabled = v == "true";
        }
        if let Some(v) = lookup("CRON_SECRET") {
            self.cron.secret = non_empty(v);
        }
        if let Some(v) = lookup("HIVE_PUBLIC_URL") {
            self.server.public_url = non_empty(v);
        }
        if let Some(v) = lookup("HIVE_DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("STAKWORK_BASE_URL") {
            self.stakwork.base_url = v;
        }
        if let Some(v) = lookup("STAKWORK_API_KEY") {
            self.stakwork.api_key = non_empty(v);
        }
        if let Some(id) = lookup("STAKWORK_JANITOR_WORKFLOW_ID").and_then(|v| v.parse().ok()) {
            self.stakwork.janitor_workflow_id = Some(id);
        }
        if let Some(id) = lookup("STAKWORK_TASK_WORKFLOW_ID").and_then(|v| v.parse().ok()) {
            self.stakwork.task_workflow_id = Some(id);
        }
        if let Some(v) = lookup("POOL_MANAGER_BASE_URL") {
            self.pool_manager.base_url = v;
        }
        if let Some(v) = lookup("POOL_MANAGER_API_KEY") {
            self.pool_manager.api_key = non_empty(v);
        }
        if let Some(v) = lookup("STORAGE_BASE_URL") {
            self.storage.base_url = v;
        }
        if let Some(v) = lookup("STORAGE_SIGNING_KEY") {
            self.storage.signing_key = non_empty(v);
        }
    }

    /// Webhook callback Stakwork should post janitor results to.
    pub fn janitor_webhook_url(&self) -> String {
        let base = self
            .server
            .public_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.server.port));
        format!("{}/api/janitors/webhook", base.trim_end_matches('/'))
    }

    /// Validate the configuration and return a list of warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let sweeps_on = self.cron.janitor_enabled || self.cron.task_coordinator_enabled;

        if sweeps_on && self.stakwork.api_key.is_none() {
            warnings.push("A cron sweep is enabled but stakwork.api_key is not set".to_string());
        }
        if self.cron.janitor_enabled && self.stakwork.janitor_workflow_id.is_none() {
            warnings.push(
                "cron.janitor_enabled is set but stakwork.janitor_workflow_id is missing"
                    .to_string(),
            );
        }
        if self.cron.task_coordinator_enabled && self.stakwork.task_workflow_id.is_none() {
            warnings.push(
                "cron.task_coordinator_enabled is set but stakwork.task_workflow_id is missing"
                    .to_string(),
            );
        }
        if sweeps_on && self.cron.secret.is_none() {
            warnings.push("cron.secret is not set; cron routes accept any caller".to_string());
        }
        if self.storage.signing_key.is_none() {
            warnings.push(
                "storage.signing_key is not set; signed media URLs use an empty key".to_string(),
            );
        }
        if self.coordinator.max_items_per_workspace == 0 {
            warnings.push(
                "coordinator.max_items_per_workspace is 0; the coordinator will never start work"
                    .to_string(),
            );
        }
        if self.coordinator.stale_agent_task_hours <= 0 {
            warnings.push("coordinator.stale_agent_task_hours must be positive".to_string());
        }
        warnings
    }
}

fn non_empty(v: String) -> Option<String> {
    if v.trim().is_empty() { None } else { Some(v) }
}
