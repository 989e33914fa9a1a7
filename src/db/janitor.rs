use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use super::HiveDb;
use crate::models::*;

const CONFIG_COLUMNS: &str = "id, workspace_id, unit_tests_enabled, integration_tests_enabled, e2e_tests_enabled, security_review_enabled, recommendation_sweep_enabled, ticket_sweep_enabled, updated_at";

const RUN_SELECT: &str = "SELECT r.id, r.config_id, c.workspace_id, r.janitor_type, r.status, r.triggered_by, r.stakwork_project_id, r.error, r.created_at, r.started_at, r.completed_at
     FROM janitor_runs r JOIN janitor_configs c ON c.id = r.config_id";

const RECOMMENDATION_COLUMNS: &str = "id, run_id, workspace_id, title, description, priority, impact, status, task_id, accepted_by_id, accepted_at, dismissed_by_id, dismissed_at, dismiss_reason, created_at";

/// SQL ordering expression for priority, most urgent first.
const PRIORITY_ORDER: &str =
    "CASE priority WHEN 'CRITICAL' THEN 0 WHEN 'HIGH' THEN 1 WHEN 'MEDIUM' THEN 2 ELSE 3 END";

fn config_from_row(row: &Row<'_>) -> rusqlite::Result<JanitorConfig> {
    Ok(JanitorConfig {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        settings: JanitorSettings {
            unit_tests_enabled: row.get(2)?,
            integration_tests_enabled: row.get(3)?,
            e2e_tests_enabled: row.get(4)?,
            security_review_enabled: row.get(5)?,
            recommendation_sweep_enabled: row.get(6)?,
            ticket_sweep_enabled: row.get(7)?,
        },
        updated_at: row.get(8)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<JanitorRun> {
    Ok(JanitorRun {
        id: row.get(0)?,
        config_id: row.get(1)?,
        workspace_id: row.get(2)?,
        janitor_type: row.get(3)?,
        status: row.get(4)?,
        triggered_by: row.get(5)?,
        stakwork_project_id: row.get(6)?,
        error: row.get(7)?,
        created_at: row.get(8)?,
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

fn recommendation_from_row(row: &Row<'_>) -> rusqlite::Result<JanitorRecommendation> {
    Ok(JanitorRecommendation {
        id: row.get(0)?,
        run_id: row.get(1)?,
        workspace_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        priority: row.get(5)?,
        impact: row.get(6)?,
        status: row.get(7)?,
        task_id: row.get(8)?,
        accepted_by_id: row.get(9)?,
        accepted_at: row.get(10)?,
        dismissed_by_id: row.get(11)?,
        dismissed_at: row.get(12)?,
        dismiss_reason: row.get(13)?,
        created_at: row.get(14)?,
    })
}

impl HiveDb {
    // ── Janitor config ────────────────────────────────────────────────

    /// Return the workspace's janitor config, creating an all-disabled one
    /// on first access.
    pub fn ensure_janitor_config(&self, workspace_id: i64) -> Result<JanitorConfig> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO janitor_configs (workspace_id, updated_at) VALUES (?1, ?2)",
                params![workspace_id, Utc::now()],
            )
            .context("Failed to insert janitor config")?;
        self.conn
            .query_row(
                &format!("SELECT {CONFIG_COLUMNS} FROM janitor_configs WHERE workspace_id = ?1"),
                params![workspace_id],
                config_from_row,
            )
            .context("Janitor config not found after insert")
    }

    pub fn update_janitor_config(
        &self,
        workspace_id: i64,
        settings: &JanitorSettings,
    ) -> Result<JanitorConfig> {
        self.ensure_janitor_config(workspace_id)?;
        self.conn
            .execute(
                "UPDATE janitor_configs SET
                    unit_tests_enabled = ?1,
                    integration_tests_enabled = ?2,
                    e2e_tests_enabled = ?3,
                    security_review_enabled = ?4,
                    recommendation_sweep_enabled = ?5,
                    ticket_sweep_enabled = ?6,
                    updated_at = ?7
                 WHERE workspace_id = ?8",
                params![
                    settings.unit_tests_enabled,
                    settings.integration_tests_enabled,
                    settings.e2e_tests_enabled,
                    settings.security_review_enabled,
                    settings.recommendation_sweep_enabled,
                    settings.ticket_sweep_enabled,
                    Utc::now(),
                    workspace_id
                ],
            )
            .context("Failed to update janitor config")?;
        self.ensure_janitor_config(workspace_id)
    }

    /// Every live workspace that has a janitor config, in id order.
    pub fn list_workspaces_with_janitor_config(&self) -> Result<Vec<WorkspaceJanitorView>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT w.id, w.name, w.slug, w.owner_id, w.repository_url, w.deleted, w.created_at, w.updated_at,
                        c.id, c.workspace_id, c.unit_tests_enabled, c.integration_tests_enabled, c.e2e_tests_enabled,
                        c.security_review_enabled, c.recommendation_sweep_enabled, c.ticket_sweep_enabled, c.updated_at
                 FROM workspaces w JOIN janitor_configs c ON c.workspace_id = w.id
                 WHERE w.deleted = 0
                 ORDER BY w.id",
            )
            .context("Failed to prepare list_workspaces_with_janitor_config")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(WorkspaceJanitorView {
                    workspace: Workspace {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        slug: row.get(2)?,
                        owner_id: row.get(3)?,
                        repository_url: row.get(4)?,
                        deleted: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    },
                    config: JanitorConfig {
                        id: row.get(8)?,
                        workspace_id: row.get(9)?,
                        settings: JanitorSettings {
                            unit_tests_enabled: row.get(10)?,
                            integration_tests_enabled: row.get(11)?,
                            e2e_tests_enabled: row.get(12)?,
                            security_review_enabled: row.get(13)?,
                            recommendation_sweep_enabled: row.get(14)?,
                            ticket_sweep_enabled: row.get(15)?,
                        },
                        updated_at: row.get(16)?,
                    },
                })
            })
            .context("Failed to query workspaces with janitor config")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read workspace row")
    }

    // ── Janitor runs ──────────────────────────────────────────────────

    pub fn create_janitor_run(
        &self,
        config_id: i64,
        janitor_type: JanitorType,
        triggered_by: JanitorTrigger,
    ) -> Result<JanitorRun> {
        self.conn
            .execute(
                "INSERT INTO janitor_runs (config_id, janitor_type, status, triggered_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    config_id,
                    janitor_type,
                    JanitorRunStatus::Pending,
                    triggered_by,
                    Utc::now()
                ],
            )
            .context("Failed to insert janitor run")?;
        let id = self.conn.last_insert_rowid();
        self.get_janitor_run(id)?
            .context("Janitor run not found after insert")
    }

    pub fn get_janitor_run(&self, id: i64) -> Result<Option<JanitorRun>> {
        self.conn
            .query_row(&format!("{RUN_SELECT} WHERE r.id = ?1"), params![id], run_from_row)
            .optional()
            .context("Failed to query janitor run")
    }

    /// The PENDING or RUNNING run of this type, if one exists.
    pub fn active_janitor_run(
        &self,
        config_id: i64,
        janitor_type: JanitorType,
    ) -> Result<Option<JanitorRun>> {
        self.conn
            .query_row(
                &format!(
                    "{RUN_SELECT} WHERE r.config_id = ?1 AND r.janitor_type = ?2
                     AND r.status IN ('PENDING', 'RUNNING') ORDER BY r.id DESC LIMIT 1"
                ),
                params![config_id, janitor_type],
                run_from_row,
            )
            .optional()
            .context("Failed to query active janitor run")
    }

    pub fn list_janitor_runs(&self, workspace_id: i64, limit: i64) -> Result<Vec<JanitorRun>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "{RUN_SELECT} WHERE c.workspace_id = ?1 ORDER BY r.id DESC LIMIT ?2"
            ))
            .context("Failed to prepare list_janitor_runs")?;
        let rows = stmt
            .query_map(params![workspace_id, limit], run_from_row)
            .context("Failed to query janitor runs")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read janitor run row")
    }

    /// PENDING → RUNNING once the workflow accepted the run.
    pub fn mark_janitor_run_running(&self, id: i64, project_id: i64) -> Result<JanitorRun> {
        self.conn
            .execute(
                "UPDATE janitor_runs SET status = ?1, stakwork_project_id = ?2, started_at = ?3 WHERE id = ?4",
                params![JanitorRunStatus::Running, project_id, Utc::now(), id],
            )
            .context("Failed to mark janitor run running")?;
        self.get_janitor_run(id)?
            .context("Janitor run not found after update")
    }

    pub fn mark_janitor_run_failed(&self, id: i64, error: &str) -> Result<JanitorRun> {
        self.conn
            .execute(
                "UPDATE janitor_runs SET status = ?1, error = ?2, completed_at = ?3 WHERE id = ?4",
                params![JanitorRunStatus::Failed, error, Utc::now(), id],
            )
            .context("Failed to mark janitor run failed")?;
        self.get_janitor_run(id)?
            .context("Janitor run not found after update")
    }

    pub fn complete_janitor_run(&self, id: i64) -> Result<JanitorRun> {
        self.conn
            .execute(
                "UPDATE janitor_runs SET status = ?1, error = NULL, completed_at = ?2 WHERE id = ?3",
                params![JanitorRunStatus::Completed, Utc::now(), id],
            )
            .context("Failed to complete janitor run")?;
        self.get_janitor_run(id)?
            .context("Janitor run not found after update")
    }

    /// Apply a run's final report in one transaction: store the findings and
    /// mark the run COMPLETED, or mark it FAILED. Returns `None` without
    /// writing anything when the run has already finished.
    pub fn finish_janitor_run(
        &self,
        id: i64,
        outcome: &JanitorRunOutcome,
    ) -> Result<Option<JanitorRun>> {
        // Single connection behind DbHandle's mutex, so unchecked is fine.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let Some(run) = self.get_janitor_run(id)? else {
            return Ok(None);
        };
        if !run.status.is_active() {
            return Ok(None);
        }

        let run = match outcome {
            JanitorRunOutcome::Completed(recommendations) => {
                for rec in recommendations {
                    self.create_recommendation(run.id, run.workspace_id, rec)?;
                }
                self.complete_janitor_run(run.id)?
            }
            JanitorRunOutcome::Failed(error) => self.mark_janitor_run_failed(run.id, error)?,
        };

        tx.commit().context("Failed to commit janitor run result")?;
        Ok(Some(run))
    }

    pub fn find_janitor_run_by_project(&self, project_id: i64) -> Result<Option<JanitorRun>> {
        self.conn
            .query_row(
                &format!("{RUN_SELECT} WHERE r.stakwork_project_id = ?1 ORDER BY r.id DESC LIMIT 1"),
                params![project_id],
                run_from_row,
            )
            .optional()
            .context("Failed to query janitor run by project")
    }

    // ── Recommendations ───────────────────────────────────────────────

    pub fn create_recommendation(
        &self,
        run_id: i64,
        workspace_id: i64,
        rec: &NewRecommendation,
    ) -> Result<JanitorRecommendation> {
        self.conn
            .execute(
                "INSERT INTO janitor_recommendations (run_id, workspace_id, title, description, priority, impact, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    run_id,
                    workspace_id,
                    rec.title,
                    rec.description,
                    rec.priority,
                    rec.impact,
                    RecommendationStatus::Pending,
                    Utc::now()
                ],
            )
            .context("Failed to insert recommendation")?;
        let id = self.conn.last_insert_rowid();
        self.get_recommendation(id)?
            .context("Recommendation not found after insert")
    }

    pub fn get_recommendation(&self, id: i64) -> Result<Option<JanitorRecommendation>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {RECOMMENDATION_COLUMNS} FROM janitor_recommendations WHERE id = ?1"
                ),
                params![id],
                recommendation_from_row,
            )
            .optional()
            .context("Failed to query recommendation")
    }

    pub fn list_recommendations(
        &self,
        workspace_id: i64,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<JanitorRecommendation>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {RECOMMENDATION_COLUMNS} FROM janitor_recommendations
                 WHERE workspace_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY {PRIORITY_ORDER}, created_at, id"
            ))
            .context("Failed to prepare list_recommendations")?;
        let rows = stmt
            .query_map(params![workspace_id, status], recommendation_from_row)
            .context("Failed to query recommendations")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read recommendation row")
    }

    /// Pending recommendations, most urgent first then oldest first.
    pub fn pending_recommendations(
        &self,
        workspace_id: i64,
        limit: i64,
    ) -> Result<Vec<JanitorRecommendation>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {RECOMMENDATION_COLUMNS} FROM janitor_recommendations
                 WHERE workspace_id = ?1 AND status = 'PENDING'
                 ORDER BY {PRIORITY_ORDER}, id
                 LIMIT ?2"
            ))
            .context("Failed to prepare pending_recommendations")?;
        let rows = stmt
            .query_map(params![workspace_id, limit], recommendation_from_row)
            .context("Failed to query pending recommendations")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read recommendation row")
    }

    pub fn accept_recommendation(
        &self,
        id: i64,
        task_id: i64,
        accepted_by: Option<i64>,
    ) -> Result<JanitorRecommendation> {
        self.conn
            .execute(
                "UPDATE janitor_recommendations SET status = ?1, task_id = ?2, accepted_by_id = ?3, accepted_at = ?4
                 WHERE id = ?5",
                params![RecommendationStatus::Accepted, task_id, accepted_by, Utc::now(), id],
            )
            .context("Failed to accept recommendation")?;
        self.get_recommendation(id)?
            .context("Recommendation not found after accept")
    }

    pub fn dismiss_recommendation(
        &self,
        id: i64,
        dismissed_by: i64,
        reason: Option<&str>,
    ) -> Result<JanitorRecommendation> {
        self.conn
            .execute(
                "UPDATE janitor_recommendations SET status = ?1, dismissed_by_id = ?2, dismissed_at = ?3, dismiss_reason = ?4
                 WHERE id = ?5",
                params![RecommendationStatus::Dismissed, dismissed_by, Utc::now(), reason, id],
            )
            .context("Failed to dismiss recommendation")?;
        self.get_recommendation(id)?
            .context("Recommendation not found after dismiss")
    }
}
