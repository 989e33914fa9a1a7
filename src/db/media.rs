use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};

use super::{HiveDb, json_column_error};
use crate::models::*;

const SCREENSHOT_COLUMNS: &str = "id, workspace_id, task_id, object_key, url, url_expires_at, page_url, action_index, hash, width, height, created_at";

fn screenshot_from_row(row: &Row<'_>) -> rusqlite::Result<Screenshot> {
    Ok(Screenshot {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        task_id: row.get(2)?,
        object_key: row.get(3)?,
        url: row.get(4)?,
        url_expires_at: row.get(5)?,
        page_url: row.get(6)?,
        action_index: row.get(7)?,
        hash: row.get(8)?,
        width: row.get(9)?,
        height: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<Artifact> {
    let content: String = row.get(3)?;
    Ok(Artifact {
        id: row.get(0)?,
        task_id: row.get(1)?,
        artifact_type: row.get(2)?,
        content: serde_json::from_str(&content).map_err(|e| json_column_error(3, e))?,
        created_at: row.get(4)?,
    })
}

impl HiveDb {
    // ── Screenshots ───────────────────────────────────────────────────

    pub fn create_screenshot(&self, shot: &NewScreenshot) -> Result<Screenshot> {
        self.conn
            .execute(
                "INSERT INTO screenshots (workspace_id, task_id, object_key, page_url, action_index, hash, width, height, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    shot.workspace_id,
                    shot.task_id,
                    shot.object_key,
                    shot.page_url,
                    shot.action_index,
                    shot.hash,
                    shot.width,
                    shot.height,
                    Utc::now()
                ],
            )
            .context("Failed to insert screenshot")?;
        let id = self.conn.last_insert_rowid();
        self.get_screenshot(id)?
            .context("Screenshot not found after insert")
    }

    pub fn get_screenshot(&self, id: i64) -> Result<Option<Screenshot>> {
        self.conn
            .query_row(
                &format!("SELECT {SCREENSHOT_COLUMNS} FROM screenshots WHERE id = ?1"),
                params![id],
                screenshot_from_row,
            )
            .optional()
            .context("Failed to query screenshot")
    }

    /// One page of a workspace's screenshots, newest first.
    ///
    /// `cursor` is the id of the last row of the previous page and is
    /// exclusive. One extra row is fetched to decide `has_more`.
    pub fn list_screenshots(
        &self,
        workspace_id: i64,
        task_id: Option<i64>,
        cursor: Option<i64>,
        limit: usize,
    ) -> Result<(Vec<Screenshot>, Pagination)> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SCREENSHOT_COLUMNS} FROM screenshots
                 WHERE workspace_id = ?1
                   AND (?2 IS NULL OR task_id = ?2)
                   AND (?3 IS NULL OR id < ?3)
                 ORDER BY id DESC
                 LIMIT ?4"
            ))
            .context("Failed to prepare list_screenshots")?;
        let fetch = (limit + 1) as i64;
        let rows = stmt
            .query_map(
                params![workspace_id, task_id, cursor, fetch],
                screenshot_from_row,
            )
            .context("Failed to query screenshots")?;
        let mut shots = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read screenshot row")?;

        let has_more = shots.len() > limit;
        shots.truncate(limit);
        let next_cursor = if has_more {
            shots.last().map(|s| s.id)
        } else {
            None
        };
        Ok((
            shots,
            Pagination {
                has_more,
                next_cursor,
            },
        ))
    }

    pub fn update_screenshot_url(
        &self,
        id: i64,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE screenshots SET url = ?1, url_expires_at = ?2 WHERE id = ?3",
                params![url, expires_at, id],
            )
            .context("Failed to update screenshot url")?;
        Ok(())
    }

    // ── Artifacts ─────────────────────────────────────────────────────

    pub fn create_artifact(
        &self,
        task_id: i64,
        artifact_type: ArtifactType,
        content: &serde_json::Value,
    ) -> Result<Artifact> {
        self.conn
            .execute(
                "INSERT INTO artifacts (task_id, artifact_type, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![task_id, artifact_type, content.to_string(), Utc::now()],
            )
            .context("Failed to insert artifact")?;
        let id = self.conn.last_insert_rowid();
        self.get_artifact(id)?
            .context("Artifact not found after insert")
    }

    pub fn get_artifact(&self, id: i64) -> Result<Option<Artifact>> {
        self.conn
            .query_row(
                "SELECT id, task_id, artifact_type, content, created_at FROM artifacts WHERE id = ?1",
                params![id],
                artifact_from_row,
            )
            .optional()
            .context("Failed to query artifact")
    }
}
