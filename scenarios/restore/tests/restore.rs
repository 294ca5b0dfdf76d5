use std::path::Path;
use std::sync::Arc;

use drill_probes::prelude::{ProbeCall, ScriptedProbes};
use drill_runner::prelude::*;
use drill_summary_model::{ComplianceMetric, ScenarioRun, StepStatus, Termination, Verdict};

fn run(probes: Arc<ScriptedProbes>, store_dir: &Path, download_path: &Path) -> ScenarioRun {
    let mut config = DrillConfig::from_toml_str("[dry_run]\npacing = 0.0\n").unwrap();
    config.store_dir = store_dir.to_path_buf();
    config.restore.download_path = download_path.to_path_buf();

    let registry = ScenarioRegistry::new().register(restore::NAME, restore::definition);
    let options = RunOptions {
        reporter: ReporterKind::Noop,
        progress: false,
        handle_signals: false,
        monitor: false,
    };

    let suite_run = Orchestrator::new(Arc::new(config), registry, probes, options)
        .unwrap()
        .run_scenario(restore::NAME, false)
        .unwrap();

    suite_run.scenario_runs()[0].clone()
}

fn args_of(probes: &ScriptedProbes, program: &str) -> Vec<String> {
    probes
        .calls()
        .into_iter()
        .find_map(|call| match call {
            ProbeCall::RunProcess { command, args } if command == program => Some(args),
            _ => None,
        })
        .unwrap()
}

#[test]
fn restores_latest_backup() {
    let dir = tempfile::tempdir().unwrap();
    let download = dir.path().join("backup.dump");
    std::fs::write(&download, b"backup").unwrap();
    let probes = Arc::new(
        ScriptedProbes::new()
            .with_process_output("sh", 0, "2026-10-17.dump\n2026-10-18.dump\n\n")
            .with_process_output("psql", 0, "1500\n"),
    );

    let scenario_run = run(probes.clone(), &dir.path().join("store"), &download);

    assert_eq!(Termination::Completed, scenario_run.termination());
    assert_eq!(ComplianceMetric::Rpo, scenario_run.compliance_metric());
    assert_eq!(Verdict::Compliant, scenario_run.compliance_verdict());
    assert!(scenario_run.errors().is_empty());

    let details = scenario_run.details();
    assert_eq!(
        Some("2026-10-18.dump"),
        details.get("backupLocation").and_then(|v| v.as_str())
    );
    assert_eq!(Some(1500), details.get("rowCount").and_then(|v| v.as_u64()));
    assert_eq!(
        Some(1024),
        details.get("backupSizeBytes").and_then(|v| v.as_u64())
    );

    let download_args = args_of(&probes, "aws");
    assert!(download_args.contains(&"s3://drill-backups/postgres/2026-10-18.dump".to_string()));
    assert!(download_args.contains(&download.display().to_string()));
    assert!(args_of(&probes, "pg_restore").contains(&download.display().to_string()));

    pretty_assertions::assert_eq!(
        vec!["sh", "aws", "createdb", "pg_restore", "psql", "dropdb"],
        probes.commands()
    );
    assert!(!download.exists());
}

#[test]
fn empty_download_aborts_before_restoring() {
    let dir = tempfile::tempdir().unwrap();
    let download = dir.path().join("backup.dump");
    let probes = Arc::new(
        ScriptedProbes::new()
            .with_process_output("sh", 0, "2026-10-18.dump")
            .with_file(&download, 0),
    );

    let scenario_run = run(probes.clone(), &dir.path().join("store"), &download);

    assert_eq!(Termination::Aborted, scenario_run.termination());
    assert_eq!(Verdict::NonCompliant, scenario_run.compliance_verdict());

    let verify = &scenario_run.step_results()[2];
    assert_eq!("verify-download", verify.name);
    assert_eq!(StepStatus::Failure, verify.outcome.status);
    assert!(verify.outcome.detail.ends_with("is empty"));

    let cleanup = scenario_run.step_results().last().unwrap();
    assert_eq!(StepStatus::Skipped, cleanup.outcome.status);
    assert_eq!("nothing to discard", cleanup.outcome.detail);
    assert_eq!(vec!["sh", "aws"], probes.commands());
}

#[test]
fn missing_backup_location_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let probes = Arc::new(ScriptedProbes::new().with_process_output("sh", 0, "  \n"));

    let scenario_run = run(
        probes.clone(),
        &dir.path().join("store"),
        &dir.path().join("backup.dump"),
    );

    assert_eq!(Termination::Aborted, scenario_run.termination());
    assert_eq!(StepStatus::Failure, scenario_run.step_results()[0].outcome.status);
    assert!(scenario_run.errors()[0].contains("did not print a backup location"));
    assert_eq!(vec!["sh"], probes.commands());
}

#[test]
fn too_few_rows_fails_verification() {
    let dir = tempfile::tempdir().unwrap();
    let probes = Arc::new(
        ScriptedProbes::new()
            .with_process_output("sh", 0, "2026-10-18.dump")
            .with_process_output("psql", 0, "0"),
    );

    let scenario_run = run(
        probes.clone(),
        &dir.path().join("store"),
        &dir.path().join("backup.dump"),
    );

    assert_eq!(Termination::Completed, scenario_run.termination());
    let rows = &scenario_run.step_results()[5];
    assert_eq!("verify-row-count", rows.name);
    assert_eq!(StepStatus::Failure, rows.outcome.status);
    assert_eq!("restored 0 rows, expected at least 1", rows.outcome.detail);
    assert_eq!(
        StepStatus::Success,
        scenario_run.step_results().last().unwrap().outcome.status
    );
    assert!(probes.commands().contains(&"dropdb".to_string()));
}
