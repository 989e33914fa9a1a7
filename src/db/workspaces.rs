use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};

use super::HiveDb;
use crate::models::*;

const WORKSPACE_COLUMNS: &str =
    "id, name, slug, owner_id, repository_url, deleted, created_at, updated_at";

const SWARM_COLUMNS: &str = "id, workspace_id, name, swarm_url, swarm_api_key, pool_name, pool_api_key, pool_state, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn workspace_from_row(row: &Row<'_>) -> rusqlite::Result<Workspace> {
    Ok(Workspace {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        owner_id: row.get(3)?,
        repository_url: row.get(4)?,
        deleted: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn swarm_from_row(row: &Row<'_>) -> rusqlite::Result<Swarm> {
    Ok(Swarm {
        id: row.get(0)?,
        workspace_id: row.get(1)?,
        name: row.get(2)?,
        swarm_url: row.get(3)?,
        swarm_api_key: row.get(4)?,
        pool_name: row.get(5)?,
        pool_api_key: row.get(6)?,
        pool_state: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl HiveDb {
    // ── Users ─────────────────────────────────────────────────────────

    pub fn create_user(&self, name: &str, email: &str) -> Result<User> {
        self.conn
            .execute(
                "INSERT INTO users (name, email, created_at) VALUES (?1, ?2, ?3)",
                params![name, email, Utc::now()],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, name, email, created_at FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()
            .context("Failed to query user")
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, name, email, created_at FROM users WHERE email = ?1",
                params![email],
                user_from_row,
            )
            .optional()
            .context("Failed to query user by email")
    }

    // ── Workspaces ────────────────────────────────────────────────────

    /// Create a workspace and register the owner as an OWNER member.
    pub fn create_workspace(
        &self,
        name: &str,
        slug: &str,
        owner_id: i64,
        repository_url: Option<&str>,
    ) -> Result<Workspace> {
        let now = Utc::now();
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO workspaces (name, slug, owner_id, repository_url, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![name, slug, owner_id, repository_url, now],
        )
        .context("Failed to insert workspace")?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO workspace_members (workspace_id, user_id, role, joined_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, owner_id, WorkspaceRole::Owner, now],
        )
        .context("Failed to insert owner membership")?;
        tx.commit().context("Failed to commit workspace creation")?;
        self.get_workspace(id)?
            .context("Workspace not found after insert")
    }

    /// Fetch a live (not soft-deleted) workspace by id.
    pub fn get_workspace(&self, id: i64) -> Result<Option<Workspace>> {
        self.conn
            .query_row(
                &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1 AND deleted = 0"),
                params![id],
                workspace_from_row,
            )
            .optional()
            .context("Failed to query workspace")
    }

    pub fn get_workspace_by_slug(&self, slug: &str) -> Result<Option<Workspace>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE slug = ?1 AND deleted = 0"
                ),
                params![slug],
                workspace_from_row,
            )
            .optional()
            .context("Failed to query workspace by slug")
    }

    /// True if any workspace, deleted or not, already uses `slug`.
    pub fn slug_taken(&self, slug: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM workspaces WHERE slug = ?1",
                params![slug],
                |row| row.get(0),
            )
            .context("Failed to check slug")
    }

    pub fn soft_delete_workspace(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE workspaces SET deleted = 1, updated_at = ?1 WHERE id = ?2 AND deleted = 0",
                params![Utc::now(), id],
            )
            .context("Failed to delete workspace")?;
        Ok(count > 0)
    }

    // ── Membership ────────────────────────────────────────────────────

    /// Insert or update a membership row.
    pub fn add_member(
        &self,
        workspace_id: i64,
        user_id: i64,
        role: WorkspaceRole,
    ) -> Result<WorkspaceMember> {
        self.conn
            .execute(
                "INSERT INTO workspace_members (workspace_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(workspace_id, user_id) DO UPDATE SET role = ?3",
                params![workspace_id, user_id, role, Utc::now()],
            )
            .context("Failed to upsert workspace member")?;
        self.conn
            .query_row(
                "SELECT workspace_id, user_id, role, joined_at FROM workspace_members
                 WHERE workspace_id = ?1 AND user_id = ?2",
                params![workspace_id, user_id],
                |row| {
                    Ok(WorkspaceMember {
                        workspace_id: row.get(0)?,
                        user_id: row.get(1)?,
                        role: row.get(2)?,
                        joined_at: row.get(3)?,
                    })
                },
            )
            .context("Member not found after upsert")
    }

    /// The user's role in the workspace; the owner is always `Owner`.
    pub fn member_role(&self, workspace_id: i64, user_id: i64) -> Result<Option<WorkspaceRole>> {
        let owner: Option<i64> = self
            .conn
            .query_row(
                "SELECT owner_id FROM workspaces WHERE id = ?1 AND deleted = 0",
                params![workspace_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to query workspace owner")?;
        match owner {
            None => Ok(None),
            Some(owner_id) if owner_id == user_id => Ok(Some(WorkspaceRole::Owner)),
            Some(_) => self
                .conn
                .query_row(
                    "SELECT role FROM workspace_members WHERE workspace_id = ?1 AND user_id = ?2",
                    params![workspace_id, user_id],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to query membership"),
        }
    }

    // ── Swarms ────────────────────────────────────────────────────────

    pub fn create_swarm(
        &self,
        workspace_id: i64,
        name: &str,
        swarm_url: &str,
        swarm_api_key: &str,
    ) -> Result<Swarm> {
        self.conn
            .execute(
                "INSERT INTO swarms (workspace_id, name, swarm_url, swarm_api_key, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![workspace_id, name, swarm_url, swarm_api_key, Utc::now()],
            )
            .context("Failed to insert swarm")?;
        self.get_swarm_by_workspace(workspace_id)?
            .context("Swarm not found after insert")
    }

    pub fn get_swarm_by_workspace(&self, workspace_id: i64) -> Result<Option<Swarm>> {
        self.conn
            .query_row(
                &format!("SELECT {SWARM_COLUMNS} FROM swarms WHERE workspace_id = ?1"),
                params![workspace_id],
                swarm_from_row,
            )
            .optional()
            .context("Failed to query swarm")
    }

    /// Record (or clear, with `None`) the workspace's pool and its state.
    pub fn set_swarm_pool(
        &self,
        workspace_id: i64,
        pool_name: Option<&str>,
        pool_api_key: Option<&str>,
        state: PoolState,
    ) -> Result<Swarm> {
        self.conn
            .execute(
                "UPDATE swarms SET pool_name = ?1, pool_api_key = ?2, pool_state = ?3 WHERE workspace_id = ?4",
                params![pool_name, pool_api_key, state, workspace_id],
            )
            .context("Failed to update swarm pool")?;
        self.get_swarm_by_workspace(workspace_id)?
            .context("Swarm not found after pool update")
    }

    pub fn update_pool_state(&self, workspace_id: i64, state: PoolState) -> Result<()> {
        self.conn
            .execute(
                "UPDATE swarms SET pool_state = ?1 WHERE workspace_id = ?2",
                params![state, workspace_id],
            )
            .context("Failed to update pool state")?;
        Ok(())
    }
}
