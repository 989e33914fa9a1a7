//! The task coordinator: halts stuck agent tasks, then spends each
//! workspace's per-run budget on pending recommendations and ready tickets.
//!
//! Work only starts in a workspace whose VM pool has at least
//! `coordinator.min_unused_vms` idle machines.

use anyhow::Result;
use chrono::{TimeDelta, Utc};
use tracing::{debug, info, warn};

use super::{CoordinatorReport, SweepError};
use crate::clients::{PoolClient, WorkflowClient};
use crate::config::HiveToml;
use crate::db::DbHandle;
use crate::errors::HiveError;
use crate::models::WorkspaceJanitorView;
use crate::workflows;

pub async fn run_task_coordinator(
    db: &DbHandle,
    config: &HiveToml,
    workflow: &dyn WorkflowClient,
    pool: &dyn PoolClient,
) -> Result<CoordinatorReport> {
    if !config.cron.task_coordinator_enabled {
        debug!("Task coordinator disabled; skipping sweep");
        return Ok(CoordinatorReport::disabled());
    }

    let mut errors = Vec::new();
    let tasks_halted = halt_stale_agent_tasks(db, config).await?;

    let workspaces = db
        .call(|db| db.list_workspaces_with_janitor_config())
        .await?;

    let mut processed = 0;
    let mut tasks_created = 0;
    for view in workspaces {
        if !view.config.settings.coordinator_enabled() {
            continue;
        }
        processed += 1;
        let slug = &view.workspace.slug;
        if let Err(e) =
            sweep_workspace(db, config, workflow, pool, &view, &mut tasks_created, &mut errors).await
        {
            warn!(workspace = %slug, error = %format!("{e:#}"), "Workspace sweep failed");
            errors.push(SweepError::for_workspace(slug, format!("{e:#}")));
        }
    }

    info!(
        workspaces = processed,
        tasks_created,
        tasks_halted,
        errors = errors.len(),
        "Task coordinator finished"
    );
    Ok(CoordinatorReport {
        success: errors.is_empty(),
        message: None,
        workspaces_processed: processed,
        tasks_created,
        tasks_halted,
        error_count: errors.len(),
        errors,
        timestamp: Utc::now(),
    })
}

async fn halt_stale_agent_tasks(db: &DbHandle, config: &HiveToml) -> Result<usize> {
    let hours = config.coordinator.stale_agent_task_hours;
    let cutoff = TimeDelta::try_hours(hours)
        .filter(|age| *age > TimeDelta::zero())
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .ok_or_else(|| {
            HiveError::Config(format!("coordinator.stale_agent_task_hours out of range: {hours}"))
        })?;
    let halted = db
        .call(move |db| {
            let stale = db.stale_agent_tasks(cutoff)?;
            for task in &stale {
                db.halt_task(task.id)?;
            }
            Ok(stale.iter().map(|t| t.id).collect::<Vec<_>>())
        })
        .await?;
    if !halted.is_empty() {
        info!(count = halted.len(), task_ids = ?halted, "Halted stale agent tasks");
    }
    Ok(halted.len())
}

/// Run both stages for one workspace, adding each started task to `started`.
/// An `Err` stops this workspace only; tasks already started stay counted.
async fn sweep_workspace(
    db: &DbHandle,
    config: &HiveToml,
    workflow: &dyn WorkflowClient,
    pool: &dyn PoolClient,
    view: &WorkspaceJanitorView,
    started: &mut usize,
    errors: &mut Vec<SweepError>,
) -> Result<()> {
    let workspace = &view.workspace;
    let settings = &view.config.settings;

    if !pool_has_capacity(db, config, pool, view, errors).await? {
        return Ok(());
    }

    let mut budget = config.coordinator.max_items_per_workspace as usize;

    if settings.recommendation_sweep_enabled && budget > 0 {
        let workspace_id = workspace.id;
        let limit = budget as i64;
        let pending = db
            .call(move |db| db.pending_recommendations(workspace_id, limit))
            .await?;
        for rec in pending {
            budget -= 1;
            match workflows::accept_recommendation(db, config, workflow, rec.id, None).await {
                Ok(accepted) => match accepted.workflow_error {
                    None => *started += 1,
                    Some(e) => errors.push(
                        SweepError::for_workspace(&workspace.slug, e).recommendation(rec.id),
                    ),
                },
                Err(e) => errors.push(
                    SweepError::for_workspace(&workspace.slug, e).recommendation(rec.id),
                ),
            }
        }
    }

    if settings.ticket_sweep_enabled && budget > 0 {
        let workspace_id = workspace.id;
        let limit = budget;
        let tickets = db
            .call(move |db| db.ready_tickets(workspace_id, limit))
            .await?;
        for ticket in tickets {
            match workflows::start_task(db, config, workflow, workspace, &ticket).await {
                Ok(_) => *started += 1,
                Err(e) => {
                    errors.push(SweepError::for_workspace(&workspace.slug, e).task(ticket.id))
                }
            }
        }
    }

    Ok(())
}

/// True when the workspace's pool reports enough idle VMs to take new work.
/// Workspaces without a pool are skipped without an error.
async fn pool_has_capacity(
    db: &DbHandle,
    config: &HiveToml,
    pool: &dyn PoolClient,
    view: &WorkspaceJanitorView,
    errors: &mut Vec<SweepError>,
) -> Result<bool> {
    let workspace_id = view.workspace.id;
    let slug = &view.workspace.slug;
    let swarm = db
        .call(move |db| db.get_swarm_by_workspace(workspace_id))
        .await?;
    let Some((pool_name, pool_key)) = swarm.and_then(|s| match (s.pool_name, s.pool_api_key) {
        (Some(name), Some(key)) => Some((name, key)),
        _ => None,
    }) else {
        debug!(workspace = %slug, "No pool configured; skipping");
        return Ok(false);
    };

    match pool.pool_status(&pool_name, &pool_key).await {
        Ok(status) if status.unused_vms >= config.coordinator.min_unused_vms => Ok(true),
        Ok(status) => {
            debug!(
                workspace = %slug,
                unused_vms = status.unused_vms,
                required = config.coordinator.min_unused_vms,
                "Not enough idle VMs; skipping"
            );
            Ok(false)
        }
        Err(e) => {
            warn!(workspace = %slug, error = %e, "Pool status query failed");
            errors.push(SweepError::for_workspace(slug, e));
            Ok(false)
        }
    }
}
