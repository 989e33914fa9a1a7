use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};

use super::{HiveDb, json_column_error};
use crate::models::*;

const TASK_COLUMNS: &str = "id, workspace_id, title, description, status, priority, workflow_status, source_type, mode, system_assignee, depends_on, stakwork_project_id, created_by_id, deleted, created_at, updated_at, workflow_started_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let depends_on: String = row.get(10)?;
    Ok(Task {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: row.get(4)?,
        priority: row.get(5)?,
        workflow_status: row.get(6)?,
        source_type: row.get(7)?,
        mode: row.get(8)?,
        system_assignee: row.get(9)?,
        depends_on: serde_json::from_str(&depends_on).map_err(|e| json_column_error(10, e))?,
        stakwork_project_id: row.get(11)?,
        created_by_id: row.get(12)?,
        deleted: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
        workflow_started_at: row.get(16)?,
    })
}

impl HiveDb {
    pub fn create_task(&self, task: &NewTask) -> Result<Task> {
        let now = Utc::now();
        let depends_on =
            serde_json::to_string(&task.depends_on).context("Failed to encode dependencies")?;
        self.conn
            .execute(
                "INSERT INTO tasks (workspace_id, title, description, priority, source_type, mode, system_assignee, depends_on, created_by_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                params![
                    task.workspace_id,
                    task.title,
                    task.description,
                    task.priority,
                    task.source_type,
                    task.mode,
                    task.system_assignee,
                    depends_on,
                    task.created_by_id,
                    now
                ],
            )
            .context("Failed to insert task")?;
        let id = self.conn.last_insert_rowid();
        self.get_task(id)?.context("Task not found after insert")
    }

    /// Fetch a live (not soft-deleted) task.
    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        self.conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND deleted = 0"),
                params![id],
                task_from_row,
            )
            .optional()
            .context("Failed to query task")
    }

    pub fn list_tasks(&self, workspace_id: i64) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE workspace_id = ?1 AND deleted = 0 ORDER BY id DESC"
            ))
            .context("Failed to prepare list_tasks")?;
        let rows = stmt
            .query_map(params![workspace_id], task_from_row)
            .context("Failed to query tasks")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read task row")
    }

    pub fn update_task(&self, id: i64, update: &TaskUpdate) -> Result<Task> {
        let now = Utc::now();
        // Single connection behind DbHandle's mutex, so unchecked is fine.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(title) = &update.title {
            tx.execute(
                "UPDATE tasks SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, now, id],
            )
            .context("Failed to update task title")?;
        }
        if let Some(description) = &update.description {
            tx.execute(
                "UPDATE tasks SET description = ?1, updated_at = ?2 WHERE id = ?3",
                params![description, now, id],
            )
            .context("Failed to update task description")?;
        }
        if let Some(status) = update.status {
            tx.execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status, now, id],
            )
            .context("Failed to update task status")?;
        }
        if let Some(priority) = update.priority {
            tx.execute(
                "UPDATE tasks SET priority = ?1, updated_at = ?2 WHERE id = ?3",
                params![priority, now, id],
            )
            .context("Failed to update task priority")?;
        }
        if let Some(depends_on) = &update.depends_on {
            let encoded =
                serde_json::to_string(depends_on).context("Failed to encode dependencies")?;
            tx.execute(
                "UPDATE tasks SET depends_on = ?1, updated_at = ?2 WHERE id = ?3",
                params![encoded, now, id],
            )
            .context("Failed to update task dependencies")?;
        }

        tx.commit().context("Failed to commit task update")?;
        self.get_task(id)?.context("Task not found after update")
    }

    pub fn soft_delete_task(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE tasks SET deleted = 1, updated_at = ?1 WHERE id = ?2 AND deleted = 0",
                params![Utc::now(), id],
            )
            .context("Failed to delete task")?;
        Ok(count > 0)
    }

    /// Record that a workflow run was started for the task.
    pub fn start_task_workflow(
        &self,
        id: i64,
        project_id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<Task> {
        self.conn
            .execute(
                "UPDATE tasks SET status = ?1, workflow_status = ?2, stakwork_project_id = ?3,
                        workflow_started_at = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    TaskStatus::InProgress,
                    WorkflowStatus::InProgress,
                    project_id,
                    started_at,
                    Utc::now(),
                    id
                ],
            )
            .context("Failed to start task workflow")?;
        self.get_task(id)?
            .context("Task not found after workflow start")
    }

    pub fn set_workflow_status(&self, id: i64, status: WorkflowStatus) -> Result<Task> {
        self.conn
            .execute(
                "UPDATE tasks SET workflow_status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status, Utc::now(), id],
            )
            .context("Failed to update workflow status")?;
        self.get_task(id)?
            .context("Task not found after workflow status update")
    }

    /// Stop tracking a stuck agent workflow.
    pub fn halt_task(&self, id: i64) -> Result<Task> {
        self.set_workflow_status(id, WorkflowStatus::Halted)
    }

    /// Agent-mode tasks whose workflow has been in progress since before
    /// `cutoff`. Tasks without a start time fall back to their creation time.
    pub fn stale_agent_tasks(&self, cutoff: DateTime<Utc>) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE deleted = 0 AND mode = ?1 AND workflow_status = ?2
                 ORDER BY id"
            ))
            .context("Failed to prepare stale_agent_tasks")?;
        let rows = stmt
            .query_map(
                params![TaskMode::Agent, WorkflowStatus::InProgress],
                task_from_row,
            )
            .context("Failed to query agent tasks")?;
        let tasks = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read task row")?;
        Ok(tasks
            .into_iter()
            .filter(|t| t.workflow_started_at.unwrap_or(t.created_at) < cutoff)
            .collect())
    }

    /// Tickets the coordinator may start: TODO, workflow not yet started,
    /// assigned to the coordinator, and every dependency DONE. Most urgent
    /// first, then oldest.
    pub fn ready_tickets(&self, workspace_id: i64, limit: usize) -> Result<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE workspace_id = ?1 AND deleted = 0 AND status = ?2
                   AND workflow_status = ?3 AND system_assignee = ?4"
            ))
            .context("Failed to prepare ready_tickets")?;
        let rows = stmt
            .query_map(
                params![
                    workspace_id,
                    TaskStatus::Todo,
                    WorkflowStatus::Pending,
                    SystemAssignee::TaskCoordinator
                ],
                task_from_row,
            )
            .context("Failed to query candidate tickets")?;
        let mut candidates = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read ticket row")?;

        let statuses = self.task_statuses(workspace_id)?;
        candidates.retain(|t| {
            t.depends_on
                .iter()
                .all(|dep| statuses.get(dep) == Some(&TaskStatus::Done))
        });
        candidates.sort_by_key(|t| (t.priority.rank(), t.id));
        candidates.truncate(limit);
        Ok(candidates)
    }

    fn task_statuses(&self, workspace_id: i64) -> Result<HashMap<i64, TaskStatus>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, status FROM tasks WHERE workspace_id = ?1 AND deleted = 0")
            .context("Failed to prepare task_statuses")?;
        let rows = stmt
            .query_map(params![workspace_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, TaskStatus>(1)?))
            })
            .context("Failed to query task statuses")?;
        rows.collect::<rusqlite::Result<HashMap<_, _>>>()
            .context("Failed to read task status row")
    }
}
