//! Starting Stakwork workflows for janitor runs and tasks.
//!
//! Both the cron sweeps and the HTTP handlers go through these functions so
//! a run or task moves through the same states regardless of who started it.

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::clients::{WorkflowClient, WorkflowRequest};
use crate::config::HiveToml;
use crate::db::DbHandle;
use crate::errors::HiveError;
use crate::models::*;

/// Create a janitor run for `janitor_type` and hand it to Stakwork.
///
/// Returns `Conflict` when a run of that type is already PENDING or RUNNING.
/// A failed Stakwork call leaves the run FAILED and returns `Upstream`.
pub async fn start_janitor_run(
    db: &DbHandle,
    config: &HiveToml,
    workflow: &dyn WorkflowClient,
    workspace: &Workspace,
    config_id: i64,
    janitor_type: JanitorType,
    trigger: JanitorTrigger,
) -> Result<JanitorRun, HiveError> {
    let workspace_id = workspace.id;
    let (run, swarm) = db
        .call(move |db| {
            if db.active_janitor_run(config_id, janitor_type)?.is_some() {
                return Ok(None);
            }
            let run = db.create_janitor_run(config_id, janitor_type, trigger)?;
            let swarm = db.get_swarm_by_workspace(workspace_id)?;
            Ok(Some((run, swarm)))
        })
        .await?
        .ok_or_else(|| HiveError::Conflict(format!("{} janitor is already running", janitor_type)))?;

    let vars = json!({
        "janitorType": janitor_type,
        "runId": run.id,
        "workspaceId": workspace.id,
        "workspaceSlug": workspace.slug,
        "repositoryUrl": workspace.repository_url,
        "swarmUrl": swarm.as_ref().map(|s| s.swarm_url.clone()),
        "webhookUrl": config.janitor_webhook_url(),
    });

    let outcome = match config.stakwork.janitor_workflow_id {
        Some(workflow_id) => workflow
            .create_project(&WorkflowRequest {
                name: format!("janitor-{}-{}", janitor_type.as_str().to_lowercase(), run.id),
                workflow_id,
                vars,
            })
            .await
            .map_err(|e| HiveError::upstream("Stakwork", e)),
        None => Err(HiveError::Config(
            "stakwork.janitor_workflow_id is not set".to_string(),
        )),
    };

    let run_id = run.id;
    match outcome {
        Ok(project_id) => {
            let run = db
                .call(move |db| db.mark_janitor_run_running(run_id, project_id))
                .await?;
            info!(
                workspace = %workspace.slug,
                janitor_type = %janitor_type,
                run_id,
                project_id,
                "Janitor run started"
            );
            Ok(run)
        }
        Err(err) => {
            let message = err.to_string();
            warn!(
                workspace = %workspace.slug,
                janitor_type = %janitor_type,
                run_id,
                error = %message,
                "Janitor run failed to start"
            );
            db.call(move |db| db.mark_janitor_run_failed(run_id, &message))
                .await?;
            Err(err)
        }
    }
}

/// Start the Stakwork workflow for a task.
///
/// On success the task is IN_PROGRESS with its project id recorded. On
/// failure its workflow status becomes FAILED and the error is returned.
pub async fn start_task(
    db: &DbHandle,
    config: &HiveToml,
    workflow: &dyn WorkflowClient,
    workspace: &Workspace,
    task: &Task,
) -> Result<Task, HiveError> {
    let workspace_id = workspace.id;
    let swarm = db
        .call(move |db| db.get_swarm_by_workspace(workspace_id))
        .await?;

    let vars = json!({
        "taskId": task.id,
        "title": task.title,
        "description": task.description,
        "priority": task.priority,
        "mode": task.mode,
        "sourceType": task.source_type,
        "workspaceId": workspace.id,
        "workspaceSlug": workspace.slug,
        "repositoryUrl": workspace.repository_url,
        "swarmUrl": swarm.as_ref().map(|s| s.swarm_url.clone()),
    });

    let outcome = match config.stakwork.task_workflow_id {
        Some(workflow_id) => workflow
            .create_project(&WorkflowRequest {
                name: format!("task-{}", task.id),
                workflow_id,
                vars,
            })
            .await
            .map_err(|e| HiveError::upstream("Stakwork", e)),
        None => Err(HiveError::Config(
            "stakwork.task_workflow_id is not set".to_string(),
        )),
    };

    let task_id = task.id;
    match outcome {
        Ok(project_id) => {
            let task = db
                .call(move |db| db.start_task_workflow(task_id, project_id, Utc::now()))
                .await?;
            info!(workspace = %workspace.slug, task_id, project_id, "Task workflow started");
            Ok(task)
        }
        Err(err) => {
            warn!(workspace = %workspace.slug, task_id, error = %err, "Task workflow failed to start");
            db.call(move |db| db.set_workflow_status(task_id, WorkflowStatus::Failed))
                .await?;
            Err(err)
        }
    }
}

/// Result of accepting a recommendation.
#[derive(Debug)]
pub struct Accepted {
    pub recommendation: JanitorRecommendation,
    pub task: Task,
    /// Set when the task was created but its workflow could not be started.
    pub workflow_error: Option<HiveError>,
}

/// Turn a pending recommendation into a task and start the task's workflow.
///
/// The recommendation is ACCEPTED as soon as the task exists; a workflow
/// failure is reported in `workflow_error` rather than undoing the accept.
pub async fn accept_recommendation(
    db: &DbHandle,
    config: &HiveToml,
    workflow: &dyn WorkflowClient,
    recommendation_id: i64,
    accepted_by: Option<i64>,
) -> Result<Accepted, HiveError> {
    let (workspace, recommendation, task) = db
        .call(move |db| {
            let Some(rec) = db.get_recommendation(recommendation_id)? else {
                return Ok(Err(HiveError::NotFound("Recommendation".into())));
            };
            if rec.status != RecommendationStatus::Pending {
                return Ok(Err(HiveError::Conflict(format!(
                    "Recommendation is already {}",
                    rec.status
                ))));
            }
            let Some(workspace) = db.get_workspace(rec.workspace_id)? else {
                return Ok(Err(HiveError::WorkspaceNotFound));
            };
            let task = db.create_task(&NewTask {
                description: rec.description.clone(),
                priority: rec.priority,
                source_type: TaskSource::Janitor,
                created_by_id: accepted_by,
                ..NewTask::new(rec.workspace_id, rec.title.clone())
            })?;
            let rec = db.accept_recommendation(rec.id, task.id, accepted_by)?;
            Ok(Ok((workspace, rec, task)))
        })
        .await??;

    match start_task(db, config, workflow, &workspace, &task).await {
        Ok(task) => Ok(Accepted {
            recommendation,
            task,
            workflow_error: None,
        }),
        Err(err) => {
            let task_id = task.id;
            let task = db
                .call(move |db| db.get_task(task_id))
                .await?
                .unwrap_or(task);
            Ok(Accepted {
                recommendation,
                task,
                workflow_error: Some(err),
            })
        }
    }
}
