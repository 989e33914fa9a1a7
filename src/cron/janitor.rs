use anyhow::Result;
use tracing::{debug, info};

use super::{JanitorSweepReport, SweepError};
use crate::clients::WorkflowClient;
use crate::config::HiveToml;
use crate::db::DbHandle;
use crate::models::JanitorTrigger;
use crate::workflows;

/// Start one scheduled run per enabled janitor type in every workspace.
pub async fn run_janitor_sweep(
    db: &DbHandle,
    config: &HiveToml,
    workflow: &dyn WorkflowClient,
) -> Result<JanitorSweepReport> {
    if !config.cron.janitor_enabled {
        debug!("Janitor cron disabled; skipping sweep");
        return Ok(JanitorSweepReport::disabled());
    }

    let workspaces = db
        .call(|db| db.list_workspaces_with_janitor_config())
        .await?;

    let mut processed = 0;
    let mut runs_created = 0;
    let mut errors = Vec::new();

    for view in workspaces {
        let enabled = view.config.settings.enabled_types();
        if enabled.is_empty() {
            continue;
        }
        processed += 1;

        for janitor_type in enabled {
            match workflows::start_janitor_run(
                db,
                config,
                workflow,
                &view.workspace,
                view.config.id,
                janitor_type,
                JanitorTrigger::Scheduled,
            )
            .await
            {
                Ok(_) => runs_created += 1,
                Err(e) => errors.push(
                    SweepError::for_workspace(&view.workspace.slug, e).janitor(janitor_type),
                ),
            }
        }
    }

    info!(
        workspaces = processed,
        runs_created,
        errors = errors.len(),
        "Janitor sweep finished"
    );
    Ok(JanitorSweepReport::finish(processed, runs_created, errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::testing::FakeWorkflow;
    use crate::db::HiveDb;
    use crate::models::*;

    fn enabled_config() -> HiveToml {
        let mut config = HiveToml::default();
        config.cron.janitor_enabled = true;
        config.stakwork.janitor_workflow_id = Some(7);
        config
    }

    /// Two workspaces: `acme` with unit + security janitors, `idle` with none.
    fn seeded_db() -> DbHandle {
        let db = HiveDb::new_in_memory().unwrap();
        let owner = db.create_user("Owner", "owner@example.com").unwrap();
        let acme = db.create_workspace("Acme", "acme", owner.id, None).unwrap();
        db.update_janitor_config(
            acme.id,
            &JanitorSettings {
                unit_tests_enabled: true,
                security_review_enabled: true,
                ..Default::default()
            },
        )
        .unwrap();
        let idle = db.create_workspace("Idle", "idle", owner.id, None).unwrap();
        db.ensure_janitor_config(idle.id).unwrap();
        DbHandle::new(db)
    }

    #[tokio::test]
    async fn test_disabled_flag_makes_no_calls() {
        let db = seeded_db();
        let workflow = FakeWorkflow::new();
        let report = run_janitor_sweep(&db, &HiveToml::default(), &workflow)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.message.as_deref(), Some("Janitor cron is disabled"));
        assert_eq!(report.workspaces_processed, 0);
        assert_eq!(report.runs_created, 0);
        assert!(workflow.requests().is_empty());
        let runs = db.call(|db| db.list_janitor_runs(1, 10)).await.unwrap();
        assert!(runs.is_empty());
    }

    #[tokio::test]
    async fn test_one_run_per_enabled_type() {
        let db = seeded_db();
        let workflow = FakeWorkflow::new();
        let report = run_janitor_sweep(&db, &enabled_config(), &workflow)
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.workspaces_processed, 1);
        assert_eq!(report.runs_created, 2);
        assert_eq!(report.error_count, 0);

        let runs = db.call(|db| db.list_janitor_runs(1, 10)).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.status == JanitorRunStatus::Running));
        assert!(runs.iter().all(|r| r.triggered_by == JanitorTrigger::Scheduled));

        let types: Vec<_> = workflow
            .requests()
            .iter()
            .map(|r| r.vars["janitorType"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(types, vec!["UNIT_TESTS", "SECURITY_REVIEW"]);
    }

    #[tokio::test]
    async fn test_active_runs_are_reported_not_duplicated() {
        let db = seeded_db();
        let workflow = FakeWorkflow::new();
        let config = enabled_config();
        run_janitor_sweep(&db, &config, &workflow).await.unwrap();

        let report = run_janitor_sweep(&db, &config, &workflow).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.runs_created, 0);
        assert_eq!(report.error_count, 2);
        assert_eq!(report.errors.len(), report.error_count);
        assert_eq!(report.errors[0].error, "UNIT_TESTS janitor is already running");
        assert_eq!(report.errors[0].workspace_slug.as_deref(), Some("acme"));
        assert_eq!(workflow.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_stakwork_failure_is_collected() {
        let db = seeded_db();
        let workflow = FakeWorkflow::new();
        workflow.fail_with(500, "engine down");

        let report = run_janitor_sweep(&db, &enabled_config(), &workflow)
            .await
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.workspaces_processed, 1);
        assert_eq!(report.runs_created, 0);
        assert_eq!(report.error_count, 2);
        assert_eq!(report.errors[1].janitor_type, Some(JanitorType::SecurityReview));

        let runs = db.call(|db| db.list_janitor_runs(1, 10)).await.unwrap();
        assert!(runs.iter().all(|r| r.status == JanitorRunStatus::Failed));
        assert!(runs.iter().all(|r| r.error.is_some()));
    }

    #[tokio::test]
    async fn test_deleted_workspaces_are_skipped() {
        let db = seeded_db();
        db.call(|db| db.soft_delete_workspace(1)).await.unwrap();
        let workflow = FakeWorkflow::new();

        let report = run_janitor_sweep(&db, &enabled_config(), &workflow)
            .await
            .unwrap();
        assert!(report.success);
        assert_eq!(report.workspaces_processed, 0);
        assert!(workflow.requests().is_empty());
    }
}
