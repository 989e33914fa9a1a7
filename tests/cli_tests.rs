//! CLI tests for the `hive` binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Variables `hive` reads as overrides; cleared so the host cannot leak in.
const HIVE_ENV: &[&str] = &[
    "HIVE_CONFIG",
    "JANITOR_CRON_ENABLED",
    "TASK_COORDINATOR_ENABLED",
    "CRON_SECRET",
    "HIVE_PUBLIC_URL",
    "HIVE_DATABASE_PATH",
    "STAKWORK_BASE_URL",
    "STAKWORK_API_KEY",
    "STAKWORK_JANITOR_WORKFLOW_ID",
    "STAKWORK_TASK_WORKFLOW_ID",
    "POOL_MANAGER_BASE_URL",
    "POOL_MANAGER_API_KEY",
    "STORAGE_BASE_URL",
    "STORAGE_SIGNING_KEY",
];

/// A `hive` command running inside `dir` with a clean environment.
fn hive(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("hive");
    cmd.current_dir(dir.path());
    for var in HIVE_ENV {
        cmd.env_remove(var);
    }
    cmd
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_hive_help() {
        let dir = TempDir::new().unwrap();
        hive(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("cron"));
    }

    #[test]
    fn test_hive_version() {
        let dir = TempDir::new().unwrap();
        hive(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        let dir = TempDir::new().unwrap();
        hive(&dir).arg("bogus").assert().failure();
    }
}

mod config_commands {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        hive(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No hive.toml found"))
            .stdout(predicate::str::contains("port = 3000"))
            .stdout(predicate::str::contains("janitor_enabled = false"));
    }

    #[test]
    fn test_config_show_hides_secrets() {
        let dir = TempDir::new().unwrap();
        hive(&dir)
            .env("STAKWORK_API_KEY", "super-secret-key")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("api_key = (set)"))
            .stdout(predicate::str::contains("super-secret-key").not());
    }

    #[test]
    fn test_config_init_creates_toml() {
        let dir = TempDir::new().unwrap();
        hive(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created hive.toml"));

        let content = fs::read_to_string(dir.path().join("hive.toml")).unwrap();
        assert!(content.contains("[cron]"));
        assert!(content.contains("[coordinator]"));

        hive(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_reports_missing_workflow() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("hive.toml"),
            "[cron]\njanitor_enabled = true\n",
        )
        .unwrap();
        hive(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings"))
            .stdout(predicate::str::contains("janitor_workflow_id is missing"));
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("hive.toml"),
            "[cron]\njanitor_enabled = true\n",
        )
        .unwrap();
        hive(&dir)
            .env("JANITOR_CRON_ENABLED", "false")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("janitor_enabled = false"));
    }

    #[test]
    fn test_invalid_toml_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hive.toml"), "[cron\n").unwrap();
        hive(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse hive.toml"));
    }
}

mod database_commands {
    use super::*;

    #[test]
    fn test_init_db_creates_file() {
        let dir = TempDir::new().unwrap();
        hive(&dir)
            .args(["init-db", "--db-path", "data/hive.db"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Hive database initialized"));
        assert!(dir.path().join("data/hive.db").exists());
    }

    #[test]
    fn test_init_db_uses_configured_path() {
        let dir = TempDir::new().unwrap();
        hive(&dir)
            .env("HIVE_DATABASE_PATH", "state/custom.db")
            .arg("init-db")
            .assert()
            .success();
        assert!(dir.path().join("state/custom.db").exists());
    }
}

mod cron_commands {
    use super::*;

    #[test]
    fn test_janitor_cron_disabled_report() {
        let dir = TempDir::new().unwrap();
        let output = hive(&dir).args(["cron", "janitors"]).output().unwrap();
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["success"], true);
        assert_eq!(report["message"], "Janitor cron is disabled");
        assert_eq!(report["workspacesProcessed"], 0);
        assert_eq!(report["runsCreated"], 0);
        assert_eq!(report["errorCount"], 0);
    }

    #[test]
    fn test_task_coordinator_disabled_report() {
        let dir = TempDir::new().unwrap();
        let output = hive(&dir)
            .args(["cron", "task-coordinator"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["success"], true);
        assert_eq!(report["message"], "Task coordinator is disabled");
        assert_eq!(report["tasksHalted"], 0);
    }

    #[test]
    fn test_enabled_sweep_with_empty_database() {
        let dir = TempDir::new().unwrap();
        let output = hive(&dir)
            .env("JANITOR_CRON_ENABLED", "true")
            .args(["cron", "janitors"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["success"], true);
        assert!(report.get("message").is_none());
        assert_eq!(report["workspacesProcessed"], 0);
        assert_eq!(report["errors"], serde_json::json!([]));
    }
}
