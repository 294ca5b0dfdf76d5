use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use drill::{exit_code, list, report, run};
use drill_probes::prelude::ScriptedProbes;
use drill_runner::prelude::*;
use drill_summary_model::{SuiteRun, Termination, Verdict};

fn config(store_dir: &Path) -> Arc<DrillConfig> {
    let mut config = DrillConfig::from_toml_str(
        r#"
[timeouts]
poll_interval_ms = 1
settle_seconds = 0

[dry_run]
pacing = 0.0
"#,
    )
    .unwrap();
    config.store_dir = store_dir.to_path_buf();
    config.restore.download_path = store_dir.join("backup.dump");
    Arc::new(config)
}

fn run_args(suite: Option<&str>, scenario: Option<&str>, dry_run: bool, output: &Path) -> RunArgs {
    RunArgs {
        suite: suite.map(str::to_string),
        scenario: scenario.map(str::to_string),
        dry_run,
        format: ReportFormatOpt::Json,
        output: Some(output.to_path_buf()),
        no_progress: true,
        reporter: ReporterOpt::Noop,
    }
}

#[test]
fn dry_run_of_full_suite_is_compliant_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("report.json");
    let probes = Arc::new(ScriptedProbes::new());

    let suite_run = run(
        &run_args(Some("full"), None, true, &output),
        config(&dir.path().join("store")),
        probes.clone(),
    )
    .unwrap();

    assert_eq!(0, probes.call_count());
    assert_eq!(Verdict::Compliant, suite_run.compliance_verdict());
    assert_eq!(0, exit_code(suite_run.compliance_verdict()));
    pretty_assertions::assert_eq!(
        vec!["failover", "restore", "service-recovery"],
        suite_run
            .scenario_runs()
            .iter()
            .map(|r| r.scenario_name())
            .collect::<Vec<_>>()
    );

    let written: SuiteRun = serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
    assert_eq!(suite_run.id(), written.id());
    assert_eq!(suite_run.compliance_verdict(), written.compliance_verdict());
    assert_eq!(3, written.scenario_runs().len());
}

#[test]
fn failed_critical_step_gives_non_compliant_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let probes = Arc::new(ScriptedProbes::new().with_process_output("sh", 1, ""));

    let suite_run = run(
        &run_args(None, Some("restore"), false, &dir.path().join("report.json")),
        config(&dir.path().join("store")),
        probes,
    )
    .unwrap();

    assert_eq!("restore", suite_run.suite_name());
    assert_eq!(
        Termination::Aborted,
        suite_run.scenario_runs()[0].termination()
    );
    assert_eq!(1, exit_code(suite_run.compliance_verdict()));
}

#[test]
fn unknown_suite_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    let result = run(
        &run_args(Some("nightly"), None, true, &dir.path().join("report.json")),
        config(&dir.path().join("store")),
        Arc::new(ScriptedProbes::new()),
    );

    assert!(result.is_err());
}

#[test]
fn report_renders_latest_stored_suite() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir.path().join("store"));
    let probes = Arc::new(ScriptedProbes::new());

    run(
        &run_args(Some("quick"), None, true, &dir.path().join("first.json")),
        config.clone(),
        probes.clone(),
    )
    .unwrap();
    // Stored suites are ordered by start time.
    std::thread::sleep(Duration::from_millis(5));
    let latest = run(
        &run_args(None, Some("failover"), true, &dir.path().join("second.json")),
        config.clone(),
        probes,
    )
    .unwrap();

    let output = dir.path().join("report.html");
    let reported = report(
        &ReportArgs {
            suite_id: None,
            format: ReportFormatOpt::Html,
            output: Some(output.clone()),
        },
        &config,
    )
    .unwrap();

    assert_eq!(latest.id(), reported.id());
    assert_eq!(
        latest.scenario_runs()[0].step_names(),
        reported.scenario_runs()[0].step_names()
    );
    let html = std::fs::read_to_string(&output).unwrap();
    assert!(html.contains("Suite failover"));

    let listing = list(&config).unwrap();
    assert!(listing.contains(latest.id()));
    assert!(listing.contains("service-recovery"));
}

#[test]
fn report_without_stored_suites_is_an_error() {
    let dir = tempfile::tempdir().unwrap();

    let result = report(
        &ReportArgs {
            suite_id: None,
            format: ReportFormatOpt::Text,
            output: None,
        },
        &config(dir.path()),
    );

    assert!(result.is_err());
}
