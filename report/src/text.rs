use std::fmt::Write;

use drill_summary_model::{ScenarioRun, StepStatus, SuiteRun};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::format;

#[derive(Tabled)]
struct ScenarioRow {
    scenario: String,
    verdict: String,
    total: String,
    target: String,
    margin: String,
    termination: String,
    errors: usize,
}

#[derive(Tabled)]
struct StepRow {
    step: String,
    bucket: String,
    status: String,
    time: String,
    #[tabled(display = "yes_no")]
    critical: bool,
    detail: String,
}

fn yes_no(value: &bool) -> String {
    if *value { "yes" } else { "" }.to_string()
}

pub(crate) fn render(suite_run: &SuiteRun) -> Result<String, std::fmt::Error> {
    let mut out = String::new();

    writeln!(
        out,
        "Suite {} ({}) {}{}",
        suite_run.suite_name(),
        suite_run.id(),
        suite_run.compliance_verdict(),
        if suite_run.dry_run() { ", dry run" } else { "" }
    )?;
    writeln!(
        out,
        "Started {}, ended {}",
        format::timestamp(suite_run.started_at()),
        format::timestamp(suite_run.ended_at())
    )?;
    if suite_run.cancelled() {
        writeln!(out, "The drill was cancelled before every scenario finished")?;
    }

    if suite_run.scenario_runs().is_empty() {
        writeln!(out, "\nNo scenarios were run")?;
    } else {
        let rows = suite_run.scenario_runs().iter().map(scenario_row);
        writeln!(out, "\n{}", Table::new(rows).with(Style::modern()))?;
    }

    for scenario_run in suite_run.scenario_runs() {
        writeln!(
            out,
            "\nSteps of {} ({})",
            scenario_run.scenario_name(),
            scenario_run.id()
        )?;
        let rows = scenario_run.step_results().iter().map(|step| StepRow {
            step: step.name.clone(),
            bucket: step.bucket.clone(),
            status: status(step.outcome.status).to_string(),
            time: format::duration(step.outcome.measured_ms),
            critical: step.critical,
            detail: step.outcome.detail.clone(),
        });
        writeln!(out, "{}", Table::new(rows).with(Style::modern()))?;
    }

    let errors = suite_run.all_errors();
    if !errors.is_empty() {
        writeln!(out, "\nErrors")?;
        for error in errors {
            writeln!(out, "  - {error}")?;
        }
    }

    Ok(out)
}

fn scenario_row(scenario_run: &ScenarioRun) -> ScenarioRow {
    ScenarioRow {
        scenario: scenario_run.scenario_name().to_string(),
        verdict: scenario_run.compliance_verdict().to_string(),
        total: format::duration(scenario_run.total_duration_ms()),
        target: format::target(scenario_run),
        margin: format::margin(scenario_run.compliance_margin_pct()),
        termination: scenario_run.termination().to_string(),
        errors: scenario_run.errors().len(),
    }
}

pub(crate) fn status(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Success => "success",
        StepStatus::Failure => "failure",
        StepStatus::Skipped => "skipped",
    }
}
