use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use drill_probes::prelude::{ProbeCall, ScriptedProbes};
use drill_runner::prelude::*;
use drill_summary_model::{StepStatus, Termination, Verdict};
use pretty_assertions::assert_eq;

const CONFIG: &str = r#"
[targets.alpha]
metric = "RTO"
threshold_seconds = 60

[targets.beta]
metric = "RTO"
threshold_seconds = 60

[targets.gamma]
metric = "RPO"
threshold_seconds = 60

[suites]
three = ["alpha", "beta", "gamma"]

[dry_run]
pacing = 0.0
"#;

fn config(store_dir: &Path) -> Arc<DrillConfig> {
    let mut config = DrillConfig::from_toml_str(CONFIG).unwrap();
    config.store_dir = store_dir.to_path_buf();
    Arc::new(config)
}

fn options() -> RunOptions {
    RunOptions {
        reporter: ReporterKind::Noop,
        progress: false,
        handle_signals: false,
        monitor: false,
    }
}

fn orchestrator(
    store_dir: &Path,
    registry: ScenarioRegistry,
    probes: Arc<ScriptedProbes>,
) -> Orchestrator {
    Orchestrator::new(config(store_dir), registry, probes, options()).unwrap()
}

fn ok(_: &mut StepContext<'_>) -> ActionResult {
    Ok(Completion::done("ok"))
}

fn fails(_: &mut StepContext<'_>) -> ActionResult {
    anyhow::bail!("replica refused the connection")
}

fn explodes(_: &mut StepContext<'_>) -> ActionResult {
    panic!("step exploded")
}

fn probes_database(ctx: &mut StepContext<'_>) -> ActionResult {
    let probes = ctx.probes();
    let ready = ctx.execute(async { Ok(probes.is_database_ready("localhost", 5432).await) })?;
    ctx.record_detail("databaseReady", ready);
    Ok(Completion::done(format!("ready: {ready}")))
}

fn sleeps(ctx: &mut StepContext<'_>) -> ActionResult {
    ctx.execute(async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(())
    })?;
    Ok(Completion::done("woke up"))
}

fn waits_forever(ctx: &mut StepContext<'_>) -> ActionResult {
    ctx.execute(async {
        std::future::pending::<()>().await;
        Ok(())
    })?;
    Ok(Completion::done("unreachable"))
}

fn exploding_setup(_: &mut StepContext<'_>) -> HookResult {
    panic!("setup exploded")
}

fn slow_setup(ctx: &mut StepContext<'_>) -> HookResult {
    ctx.execute(async {
        tokio::time::sleep(Duration::from_millis(400)).await;
        Ok(())
    })
}

fn failing_setup(_: &mut StepContext<'_>) -> HookResult {
    anyhow::bail!("primary is not ready")
}

fn builder(name: &str, config: &DrillConfig) -> ScenarioDefinitionBuilder {
    ScenarioDefinitionBuilder::new(name, config.target(name).unwrap())
        .with_buckets(["detection", "recovery"])
}

fn alpha(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
    builder("alpha", config)
        .add_step(Step::new("detect", "detection", ok, simulated(10, "detected")))
        .add_step(Step::new("recover", "recovery", probes_database, simulated(20, "recovered")))
        .use_cleanup("tidy", ok, simulated(5, "tidied"))
        .build()
}

fn single_registry(
    factory: fn(&DrillConfig) -> DrillResult<ScenarioDefinition>,
) -> ScenarioRegistry {
    ScenarioRegistry::new().register("alpha", factory)
}

#[test]
fn non_critical_failure_continues() {
    fn scenario(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
        builder("alpha", config)
            .add_step(Step::new("flaky", "detection", fails, simulated(1, "x")))
            .add_step(Step::new("recover", "recovery", ok, simulated(1, "x")))
            .build()
    }

    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(
        dir.path(),
        single_registry(scenario),
        Arc::new(ScriptedProbes::new()),
    );

    let suite_run = orchestrator.run_scenario("alpha", false).unwrap();
    let run = &suite_run.scenario_runs()[0];

    let statuses = run
        .step_results()
        .iter()
        .map(|s| (s.name.as_str(), s.outcome.status))
        .collect::<Vec<_>>();
    assert_eq!(
        vec![
            ("flaky", StepStatus::Failure),
            ("recover", StepStatus::Success),
            ("cleanup", StepStatus::Skipped),
        ],
        statuses
    );
    assert_eq!(Termination::Completed, run.termination());
    assert_eq!(Verdict::Compliant, run.compliance_verdict());
    assert_eq!(
        vec!["flaky: replica refused the connection".to_string()],
        run.errors().to_vec()
    );
}

#[test]
fn critical_failure_skips_remaining_steps_and_runs_cleanup() {
    fn scenario(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
        builder("alpha", config)
            .add_step(Step::new("stop", "detection", fails, simulated(1, "x")).critical())
            .add_step(Step::new("detect", "detection", ok, simulated(1, "x")))
            .add_step(Step::new("recover", "recovery", ok, simulated(1, "x")))
            .use_cleanup("restore-primary", ok, simulated(1, "x"))
            .build()
    }

    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(
        dir.path(),
        single_registry(scenario),
        Arc::new(ScriptedProbes::new()),
    );

    let suite_run = orchestrator.run_scenario("alpha", false).unwrap();
    let run = &suite_run.scenario_runs()[0];

    assert_eq!(4, run.step_results().len());
    assert_eq!(StepStatus::Failure, run.step_results()[0].outcome.status);
    for skipped in &run.step_results()[1..3] {
        assert_eq!(StepStatus::Skipped, skipped.outcome.status);
        assert_eq!("not run: critical step stop failed", skipped.outcome.detail);
    }
    assert_eq!("restore-primary", run.step_results()[3].name);
    assert_eq!(StepStatus::Success, run.step_results()[3].outcome.status);
    assert_eq!(Termination::Aborted, run.termination());
    assert_eq!(Verdict::NonCompliant, run.compliance_verdict());
    assert_eq!(Verdict::NonCompliant, suite_run.compliance_verdict());
}

#[test]
fn setup_failure_aborts_before_the_first_step() {
    fn scenario(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
        builder("alpha", config)
            .use_setup(failing_setup)
            .add_step(Step::new("detect", "detection", ok, simulated(1, "x")))
            .use_cleanup("tidy", ok, simulated(1, "x"))
            .build()
    }

    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(
        dir.path(),
        single_registry(scenario),
        Arc::new(ScriptedProbes::new()),
    );

    let run = orchestrator.run_scenario("alpha", false).unwrap().scenario_runs()[0].clone();

    assert_eq!(StepStatus::Skipped, run.step_results()[0].outcome.status);
    assert_eq!("not run: setup failed", run.step_results()[0].outcome.detail);
    assert_eq!(StepStatus::Success, run.step_results()[1].outcome.status);
    assert_eq!(Termination::Aborted, run.termination());
    assert_eq!(vec!["setup: primary is not ready".to_string()], run.errors().to_vec());
}

#[test]
fn setup_time_is_not_part_of_the_total() {
    fn scenario(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
        builder("alpha", config)
            .use_setup(slow_setup)
            .add_step(Step::new("detect", "detection", ok, simulated(1, "x")))
            .build()
    }

    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(
        dir.path(),
        single_registry(scenario),
        Arc::new(ScriptedProbes::new()),
    );

    let before = drill_instruments::now_ms();
    let run = orchestrator.run_scenario("alpha", false).unwrap().scenario_runs()[0].clone();

    assert_eq!(Termination::Completed, run.termination());
    assert!(run.started_at() - before >= 400);
    assert!(
        run.total_duration_ms() < 400,
        "total {}ms includes setup",
        run.total_duration_ms()
    );
}

#[test]
fn step_past_its_deadline_fails_with_timeout() {
    fn scenario(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
        builder("alpha", config)
            .add_step(
                Step::new("await", "recovery", sleeps, simulated(1, "x"))
                    .with_timeout(Duration::from_millis(50)),
            )
            .build()
    }

    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(
        dir.path(),
        single_registry(scenario),
        Arc::new(ScriptedProbes::new()),
    );

    let suite_run = orchestrator.run_scenario("alpha", false).unwrap();
    let step = &suite_run.scenario_runs()[0].step_results()[0];

    assert_eq!(StepStatus::Failure, step.outcome.status);
    assert_eq!("timeout", step.outcome.detail);
    assert!(step.outcome.measured_ms < 5_000);
}

#[test]
fn panicking_step_becomes_a_failure() {
    fn scenario(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
        builder("alpha", config)
            .add_step(Step::new("explode", "detection", explodes, simulated(1, "x")))
            .add_step(Step::new("recover", "recovery", ok, simulated(1, "x")))
            .build()
    }

    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(
        dir.path(),
        single_registry(scenario),
        Arc::new(ScriptedProbes::new()),
    );

    let run = orchestrator.run_scenario("alpha", false).unwrap().scenario_runs()[0].clone();

    assert_eq!(StepStatus::Failure, run.step_results()[0].outcome.status);
    assert_eq!("step panicked: step exploded", run.step_results()[0].outcome.detail);
    assert!(run.step_results()[0].ended_at >= run.step_results()[0].started_at);
    assert_eq!(StepStatus::Success, run.step_results()[1].outcome.status);
    assert_eq!(Termination::Completed, run.termination());
}

#[test]
fn dry_run_makes_no_probe_calls() {
    let dir = tempfile::tempdir().unwrap();
    let probes = Arc::new(ScriptedProbes::new());
    let mut orchestrator = orchestrator(dir.path(), single_registry(alpha), probes.clone());

    let suite_run = orchestrator.run_scenario("alpha", true).unwrap();
    let run = &suite_run.scenario_runs()[0];

    assert_eq!(0, probes.call_count());
    assert!(run.dry_run());
    assert!(run.step_results().iter().all(|s| s.outcome.simulated));
    assert_eq!("detected", run.step_results()[0].outcome.detail);
    assert!(run.details().is_empty());
}

#[test]
fn real_run_goes_through_probes_and_records_details() {
    let dir = tempfile::tempdir().unwrap();
    let probes = Arc::new(ScriptedProbes::new().with_database_ready(5432, [true]));
    let mut orchestrator = orchestrator(dir.path(), single_registry(alpha), probes.clone());

    let suite_run = orchestrator.run_scenario("alpha", false).unwrap();
    let run = &suite_run.scenario_runs()[0];

    assert_eq!(
        vec![ProbeCall::DatabaseReady {
            host: "localhost".to_string(),
            port: 5432
        }],
        probes.calls()
    );
    assert_eq!(Some(&serde_json::Value::Bool(true)), run.details().get("databaseReady"));
    assert!(run.step_results().iter().all(|s| !s.outcome.simulated));
}

#[test]
fn step_count_and_bucket_sum_hold_for_every_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(
        dir.path(),
        single_registry(alpha),
        Arc::new(ScriptedProbes::new()),
    );
    let definition = alpha(orchestrator.config()).unwrap();

    for dry_run in [true, false] {
        let suite_run = orchestrator.run_scenario("alpha", dry_run).unwrap();
        let run = &suite_run.scenario_runs()[0];

        assert_eq!(definition.step_count(), run.step_results().len());
        let bucket_sum: u64 = run.bucket_durations().iter().map(|b| b.duration_ms).sum();
        assert!(bucket_sum <= run.total_duration_ms());
        assert_eq!(
            vec!["detection", "recovery", CLEANUP_BUCKET],
            run.bucket_durations()
                .iter()
                .map(|b| b.bucket.as_str())
                .collect::<Vec<_>>()
        );
        assert_eq!(definition.fingerprint(), run.fingerprint());
    }
}

#[test]
fn dry_runs_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(
        dir.path(),
        single_registry(alpha),
        Arc::new(ScriptedProbes::new()),
    );

    let first = orchestrator.run_scenario("alpha", true).unwrap();
    std::thread::sleep(Duration::from_millis(2));
    let second = orchestrator.run_scenario("alpha", true).unwrap();

    let (first, second) = (&first.scenario_runs()[0], &second.scenario_runs()[0]);
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert_eq!(first.step_names(), second.step_names());
    assert_ne!(first.id(), second.id());
}

#[test]
fn cancellation_mid_suite_stops_launching_scenarios() {
    fn beta(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
        builder("beta", config)
            .add_step(Step::new("wait", "detection", waits_forever, simulated(1, "x")))
            .add_step(Step::new("recover", "recovery", ok, simulated(1, "x")))
            .use_cleanup("tidy", ok, simulated(1, "x"))
            .build()
    }

    fn gamma(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
        builder("gamma", config)
            .add_step(Step::new("detect", "detection", ok, simulated(1, "x")))
            .build()
    }

    let dir = tempfile::tempdir().unwrap();
    let registry = ScenarioRegistry::new()
        .register("alpha", alpha)
        .register("beta", beta)
        .register("gamma", gamma);
    let mut orchestrator = orchestrator(dir.path(), registry, Arc::new(ScriptedProbes::new()));

    let handle = orchestrator.shutdown_handle();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        handle.shutdown();
    });

    let suite_run = orchestrator.run_suite("three", false).unwrap();
    canceller.join().unwrap();

    assert!(suite_run.cancelled());
    assert_eq!(2, suite_run.scenario_runs().len());

    let alpha = &suite_run.scenario_runs()[0];
    assert_eq!(Verdict::Compliant, alpha.compliance_verdict());

    let beta = &suite_run.scenario_runs()[1];
    assert_eq!("beta", beta.scenario_name());
    assert_eq!(Termination::Cancelled, beta.termination());
    assert_eq!(Verdict::Unknown, beta.compliance_verdict());
    assert_eq!("cancelled", beta.step_results()[0].outcome.detail);
    assert_eq!(StepStatus::Skipped, beta.step_results()[1].outcome.status);
    assert_eq!("tidy", beta.step_results()[2].name);
    assert_eq!(StepStatus::Success, beta.step_results()[2].outcome.status);

    assert_eq!(Verdict::Unknown, suite_run.compliance_verdict());
    assert!(suite_run
        .errors()
        .iter()
        .any(|e| e.contains("gamma")));
}

#[test]
fn escaped_panic_is_a_fault_and_the_suite_continues() {
    fn beta(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
        builder("beta", config)
            .use_setup(exploding_setup)
            .add_step(Step::new("detect", "detection", ok, simulated(1, "x")))
            .add_step(Step::new("recover", "recovery", ok, simulated(1, "x")))
            .build()
    }

    fn gamma(_: &DrillConfig) -> DrillResult<ScenarioDefinition> {
        anyhow::bail!("restore target is not configured")
    }

    let dir = tempfile::tempdir().unwrap();
    let registry = ScenarioRegistry::new()
        .register("alpha", alpha)
        .register("beta", beta)
        .register("gamma", gamma);
    let mut orchestrator = orchestrator(dir.path(), registry, Arc::new(ScriptedProbes::new()));

    let suite_run = orchestrator.run_suite("three", false).unwrap();

    assert_eq!(3, suite_run.scenario_runs().len());
    assert!(!suite_run.cancelled());

    let beta = &suite_run.scenario_runs()[1];
    assert_eq!(Termination::Faulted, beta.termination());
    assert_eq!(Verdict::NonCompliant, beta.compliance_verdict());
    assert_eq!(3, beta.step_results().len());
    assert!(beta
        .step_results()
        .iter()
        .all(|s| s.outcome.status == StepStatus::Skipped));
    assert_eq!(
        vec!["scenario panicked: setup exploded".to_string()],
        beta.errors().to_vec()
    );

    let gamma = &suite_run.scenario_runs()[2];
    assert_eq!(Termination::Faulted, gamma.termination());
    assert!(gamma.step_results().is_empty());
    assert!(gamma.errors()[0].contains("restore target is not configured"));

    assert_eq!(Verdict::NonCompliant, suite_run.compliance_verdict());
}

#[test]
fn suite_is_persisted_as_it_runs() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(
        dir.path(),
        single_registry(alpha),
        Arc::new(ScriptedProbes::new()),
    );

    let suite_run = orchestrator.run_scenario("alpha", true).unwrap();

    let stored = orchestrator.store().load_suite(suite_run.id()).unwrap();
    assert_eq!(suite_run.compliance_verdict(), stored.compliance_verdict());
    assert_eq!(suite_run.scenario_runs(), stored.scenario_runs());

    let listed = orchestrator.store().list_suites().unwrap();
    assert_eq!(1, listed.len());
    assert!(listed[0].is_finished());
    assert!(suite_run.id().starts_with("alpha-"));
}

#[test]
fn unknown_suite_and_scenario_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut orchestrator = orchestrator(
        dir.path(),
        single_registry(alpha),
        Arc::new(ScriptedProbes::new()),
    );

    assert!(orchestrator.run_suite("nightly", true).is_err());
    assert!(orchestrator.run_scenario("chaos", true).is_err());
    assert!(orchestrator.store().list_suites().unwrap().is_empty());
}
