use std::sync::Arc;

use drill_probes::prelude::ScriptedProbes;
use drill_runner::prelude::*;
use drill_summary_model::{ScenarioRun, StepStatus, Termination, Verdict};

fn run(probes: Arc<ScriptedProbes>, dry_run: bool) -> ScenarioRun {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DrillConfig::from_toml_str(
        r#"
[timeouts]
poll_interval_ms = 1

[dry_run]
pacing = 0.0
"#,
    )
    .unwrap();
    config.store_dir = dir.path().to_path_buf();

    let registry =
        ScenarioRegistry::new().register(service_recovery::NAME, service_recovery::definition);
    let options = RunOptions {
        reporter: ReporterKind::Noop,
        progress: false,
        handle_signals: false,
        monitor: false,
    };

    let suite_run = Orchestrator::new(Arc::new(config), registry, probes, options)
        .unwrap()
        .run_scenario(service_recovery::NAME, dry_run)
        .unwrap();

    suite_run.scenario_runs()[0].clone()
}

#[test]
fn service_comes_back() {
    let probes =
        Arc::new(ScriptedProbes::new().with_service_health("app", [true, true, false, true]));

    let scenario_run = run(probes.clone(), false);

    assert_eq!(Termination::Completed, scenario_run.termination());
    assert_eq!(Verdict::Compliant, scenario_run.compliance_verdict());
    pretty_assertions::assert_eq!(
        vec![
            "stop-service",
            "detect-service-down",
            "restart-service",
            "await-service-healthy",
            "await-health-endpoint",
            "verify-dependencies",
            "ensure-service-running"
        ],
        scenario_run.step_names()
    );
    assert_eq!(
        "app reported down after 2 polls",
        scenario_run.step_results()[1].outcome.detail
    );
    assert_eq!(vec!["docker", "docker"], probes.commands());

    let cleanup = &scenario_run.step_results()[6];
    assert_eq!(StepStatus::Skipped, cleanup.outcome.status);
    assert_eq!("app is already running", cleanup.outcome.detail);
    assert!(scenario_run.bucket_duration("restart").is_some());
}

#[test]
fn failed_restart_is_repaired_by_cleanup() {
    let probes = Arc::new(
        ScriptedProbes::new()
            .with_service_health("app", [true, false])
            .with_process_output("docker", 0, "")
            .with_process_output("docker", 1, "")
            .with_process_output("docker", 0, ""),
    );

    let scenario_run = run(probes.clone(), false);

    assert_eq!(Termination::Aborted, scenario_run.termination());
    assert_eq!(Verdict::NonCompliant, scenario_run.compliance_verdict());
    assert_eq!(
        StepStatus::Failure,
        scenario_run.step_results()[2].outcome.status
    );

    let cleanup = &scenario_run.step_results()[6];
    assert_eq!(StepStatus::Success, cleanup.outcome.status);
    assert_eq!("started app", cleanup.outcome.detail);
    assert_eq!(3, probes.commands().len());
}

#[test]
fn failed_stop_is_repaired_by_cleanup() {
    let probes = Arc::new(
        ScriptedProbes::new()
            .with_service_health("app", [true, false])
            .with_process_error("docker", "daemon did not answer")
            .with_process_output("docker", 0, ""),
    );

    let scenario_run = run(probes.clone(), false);

    assert_eq!(Termination::Aborted, scenario_run.termination());
    assert_eq!(
        StepStatus::Failure,
        scenario_run.step_results()[0].outcome.status
    );

    let cleanup = &scenario_run.step_results()[6];
    assert_eq!(StepStatus::Success, cleanup.outcome.status);
    assert_eq!("started app", cleanup.outcome.detail);
    assert_eq!(vec!["docker", "docker"], probes.commands());
}

#[test]
fn unhealthy_service_is_not_stopped() {
    let probes = Arc::new(ScriptedProbes::new().with_service_health("app", [false]));

    let scenario_run = run(probes.clone(), false);

    assert_eq!(Termination::Aborted, scenario_run.termination());
    assert!(probes.commands().is_empty());
    assert_eq!("setup: service app is not healthy", scenario_run.errors()[0]);
    assert!(scenario_run.step_results()[..6]
        .iter()
        .all(|s| s.outcome.detail == "not run: setup failed"));
    assert_eq!(
        "service was never stopped",
        scenario_run.step_results()[6].outcome.detail
    );
}

#[test]
fn dry_run_touches_nothing() {
    let probes = Arc::new(ScriptedProbes::new());

    let scenario_run = run(probes.clone(), true);

    assert_eq!(0, probes.call_count());
    assert_eq!(Termination::Completed, scenario_run.termination());
    assert_eq!(7, scenario_run.step_results().len());
}
