//! Shared domain types: rows, status enums and API view types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Declares a string-backed enum with `as_str`, `FromStr`, `Display` and
/// SQLite conversions. The wire and column representation is the same string.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                s.parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

string_enum!(
    /// Membership role inside a workspace, highest privilege first.
    WorkspaceRole {
        Owner => "OWNER",
        Admin => "ADMIN",
        Pm => "PM",
        Developer => "DEVELOPER",
        Stakeholder => "STAKEHOLDER",
        Viewer => "VIEWER",
    }
);

impl WorkspaceRole {
    /// Owners and admins may change workspace configuration and pools.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

string_enum!(PoolState {
    NotStarted => "NOT_STARTED",
    Started => "STARTED",
    Complete => "COMPLETE",
    Failed => "FAILED",
});

string_enum!(
    /// The automated checkers a workspace can enable. `ALL` is the sweep order.
    JanitorType {
        UnitTests => "UNIT_TESTS",
        IntegrationTests => "INTEGRATION_TESTS",
        E2eTests => "E2E_TESTS",
        SecurityReview => "SECURITY_REVIEW",
    }
);

string_enum!(JanitorRunStatus {
    Pending => "PENDING",
    Running => "RUNNING",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
});

impl JanitorRunStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

string_enum!(JanitorTrigger {
    Manual => "MANUAL",
    Scheduled => "SCHEDULED",
    Webhook => "WEBHOOK",
});

string_enum!(
    /// Ordered lowest to highest; `rank` gives the sweep ordering.
    Priority {
        Low => "LOW",
        Medium => "MEDIUM",
        High => "HIGH",
        Critical => "CRITICAL",
    }
);

impl Priority {
    /// Sort key where more urgent sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

string_enum!(RecommendationStatus {
    Pending => "PENDING",
    Accepted => "ACCEPTED",
    Dismissed => "DISMISSED",
});

string_enum!(TaskStatus {
    Todo => "TODO",
    InProgress => "IN_PROGRESS",
    Done => "DONE",
    Cancelled => "CANCELLED",
    Blocked => "BLOCKED",
});

string_enum!(WorkflowStatus {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Error => "ERROR",
    Halted => "HALTED",
    Failed => "FAILED",
});

string_enum!(TaskSource {
    User => "USER",
    Janitor => "JANITOR",
    TaskCoordinator => "TASK_COORDINATOR",
});

string_enum!(TaskMode {
    Live => "live",
    Agent => "agent",
});

string_enum!(SystemAssignee {
    TaskCoordinator => "TASK_COORDINATOR",
});

string_enum!(ArtifactType {
    Code => "CODE",
    Browser => "BROWSER",
    Media => "MEDIA",
    Form => "FORM",
    Longform => "LONGFORM",
    Ide => "IDE",
});

// ── Rows ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub owner_id: i64,
    pub repository_url: Option<String>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMember {
    pub workspace_id: i64,
    pub user_id: i64,
    pub role: WorkspaceRole,
    pub joined_at: DateTime<Utc>,
}

/// The workspace's swarm host and, once provisioned, its VM pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swarm {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
    pub swarm_url: String,
    #[serde(skip_serializing)]
    pub swarm_api_key: String,
    pub pool_name: Option<String>,
    #[serde(skip_serializing)]
    pub pool_api_key: Option<String>,
    pub pool_state: PoolState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JanitorSettings {
    pub unit_tests_enabled: bool,
    pub integration_tests_enabled: bool,
    pub e2e_tests_enabled: bool,
    pub security_review_enabled: bool,
    pub recommendation_sweep_enabled: bool,
    pub ticket_sweep_enabled: bool,
}

impl JanitorSettings {
    pub fn is_enabled(&self, janitor_type: JanitorType) -> bool {
        match janitor_type {
            JanitorType::UnitTests => self.unit_tests_enabled,
            JanitorType::IntegrationTests => self.integration_tests_enabled,
            JanitorType::E2eTests => self.e2e_tests_enabled,
            JanitorType::SecurityReview => self.security_review_enabled,
        }
    }

    /// Enabled janitor types in sweep order.
    pub fn enabled_types(&self) -> Vec<JanitorType> {
        JanitorType::ALL
            .iter()
            .copied()
            .filter(|t| self.is_enabled(*t))
            .collect()
    }

    pub fn coordinator_enabled(&self) -> bool {
        self.recommendation_sweep_enabled || self.ticket_sweep_enabled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JanitorConfig {
    pub id: i64,
    pub workspace_id: i64,
    #[serde(flatten)]
    pub settings: JanitorSettings,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JanitorRun {
    pub id: i64,
    pub config_id: i64,
    pub workspace_id: i64,
    pub janitor_type: JanitorType,
    pub status: JanitorRunStatus,
    pub triggered_by: JanitorTrigger,
    pub stakwork_project_id: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JanitorRecommendation {
    pub id: i64,
    pub run_id: i64,
    pub workspace_id: i64,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub impact: Option<String>,
    pub status: RecommendationStatus,
    pub task_id: Option<i64>,
    pub accepted_by_id: Option<i64>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub dismissed_by_id: Option<i64>,
    pub dismissed_at: Option<DateTime<Utc>>,
    pub dismiss_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: i64,
    pub workspace_id: i64,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub workflow_status: WorkflowStatus,
    pub source_type: TaskSource,
    pub mode: TaskMode,
    pub system_assignee: Option<SystemAssignee>,
    pub depends_on: Vec<i64>,
    pub stakwork_project_id: Option<i64>,
    pub created_by_id: Option<i64>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub workflow_started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    pub id: i64,
    pub workspace_id: i64,
    pub task_id: Option<i64>,
    pub object_key: String,
    pub url: Option<String>,
    pub url_expires_at: Option<DateTime<Utc>>,
    pub page_url: String,
    pub action_index: i64,
    pub hash: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Screenshot {
    /// True when there is no signed URL yet or the current one has lapsed.
    pub fn url_expired(&self, now: DateTime<Utc>) -> bool {
        match (&self.url, self.url_expires_at) {
            (Some(_), Some(expires)) => expires <= now,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: i64,
    pub task_id: i64,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Object key of a media artifact's payload, if the content carries one.
    pub fn object_key(&self) -> Option<&str> {
        self.content
            .get("s3Key")
            .and_then(|v| v.as_str())
            .filter(|k| !k.is_empty())
    }
}

// ── Inputs ────────────────────────────────────────────────────────────

/// Fields for a new task row.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub workspace_id: i64,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub source_type: TaskSource,
    pub mode: TaskMode,
    pub system_assignee: Option<SystemAssignee>,
    pub depends_on: Vec<i64>,
    pub created_by_id: Option<i64>,
}

impl NewTask {
    pub fn new(workspace_id: i64, title: impl Into<String>) -> Self {
        Self {
            workspace_id,
            title: title.into(),
            description: String::new(),
            priority: Priority::Medium,
            source_type: TaskSource::User,
            mode: TaskMode::Live,
            system_assignee: None,
            depends_on: Vec::new(),
            created_by_id: None,
        }
    }
}

/// Partial update for a task; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub depends_on: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecommendation {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    pub impact: Option<String>,
}

fn default_priority() -> Priority {
    Priority::Medium
}

/// Final report for a janitor run, as delivered by the workflow webhook.
#[derive(Debug, Clone)]
pub enum JanitorRunOutcome {
    Completed(Vec<NewRecommendation>),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct NewScreenshot {
    pub workspace_id: i64,
    pub task_id: Option<i64>,
    pub object_key: String,
    pub page_url: String,
    pub action_index: i64,
    pub hash: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

// ── View types ────────────────────────────────────────────────────────

/// A workspace paired with its janitor configuration, as walked by the sweeps.
#[derive(Debug, Clone)]
pub struct WorkspaceJanitorView {
    pub workspace: Workspace,
    pub config: JanitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub has_more: bool,
    pub next_cursor: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotPage {
    pub screenshots: Vec<Screenshot>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_enum_round_trip_through_str() {
        for t in JanitorType::ALL {
            assert_eq!(JanitorType::from_str(t.as_str()).unwrap(), *t);
        }
        assert!(JanitorType::from_str("LINT").is_err());
    }

    #[test]
    fn test_enum_serializes_as_wire_string() {
        let json = serde_json::to_string(&WorkflowStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let mode: TaskMode = serde_json::from_str("\"agent\"").unwrap();
        assert_eq!(mode, TaskMode::Agent);
    }

    #[test]
    fn test_priority_rank_orders_critical_first() {
        let mut ps = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
        ps.sort_by_key(|p| p.rank());
        assert_eq!(
            ps,
            vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[test]
    fn test_enabled_types_keep_sweep_order() {
        let settings = JanitorSettings {
            security_review_enabled: true,
            unit_tests_enabled: true,
            ..Default::default()
        };
        assert_eq!(
            settings.enabled_types(),
            vec![JanitorType::UnitTests, JanitorType::SecurityReview]
        );
        assert!(!settings.coordinator_enabled());
    }

    #[test]
    fn test_screenshot_url_expiry() {
        let now = Utc::now();
        let mut shot = Screenshot {
            id: 1,
            workspace_id: 1,
            task_id: None,
            object_key: "k".into(),
            url: None,
            url_expires_at: None,
            page_url: "https://example.com".into(),
            action_index: 0,
            hash: "h".into(),
            width: None,
            height: None,
            created_at: now,
        };
        assert!(shot.url_expired(now));
        shot.url = Some("https://cdn/k".into());
        shot.url_expires_at = Some(now + Duration::hours(1));
        assert!(!shot.url_expired(now));
        shot.url_expires_at = Some(now - Duration::seconds(1));
        assert!(shot.url_expired(now));
    }

    #[test]
    fn test_artifact_object_key() {
        let artifact = Artifact {
            id: 1,
            task_id: 2,
            artifact_type: ArtifactType::Media,
            content: serde_json::json!({"s3Key": "tasks/2/video.webm"}),
            created_at: Utc::now(),
        };
        assert_eq!(artifact.object_key(), Some("tasks/2/video.webm"));

        let empty = Artifact {
            content: serde_json::json!({"s3Key": ""}),
            ..artifact
        };
        assert_eq!(empty.object_key(), None);
    }
}
