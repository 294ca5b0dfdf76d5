use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use drill_instruments::now_ms;
use drill_summary_model::{ScenarioRun, ScenarioRunRecorder, StepResult, Termination};

use crate::context::{RunnerContext, StepContext};
use crate::definition::ScenarioDefinition;
use crate::step::{describe_error, execute_step, panic_message};

/// Why the remaining steps of a scenario were not run.
enum Abort {
    Setup,
    Critical(String),
    Cancelled,
}

impl Abort {
    fn termination(&self) -> Termination {
        match self {
            Abort::Setup | Abort::Critical(_) => Termination::Aborted,
            Abort::Cancelled => Termination::Cancelled,
        }
    }

    fn reason(&self) -> String {
        match self {
            Abort::Setup => "not run: setup failed".to_string(),
            Abort::Critical(step) => format!("not run: critical step {step} failed"),
            Abort::Cancelled => "not run: cancelled".to_string(),
        }
    }
}

/// Run a scenario to completion and seal its record.
///
/// Steps run in order until a critical step fails, setup fails or the drill is cancelled. Steps
/// after that point are recorded as skipped. The cleanup step runs on every path, without
/// cancellation and with its own deadline. Panics inside steps are contained by the step executor,
/// a panic anywhere else is left to the caller.
pub fn run_scenario(
    definition: &ScenarioDefinition,
    runner_context: &RunnerContext,
    dry_run: bool,
) -> ScenarioRun {
    let config = runner_context.config();

    log::info!(
        "Running scenario {} ({} steps{})",
        definition.name(),
        definition.step_count(),
        if dry_run { ", dry run" } else { "" }
    );

    let mut recorder = ScenarioRunRecorder::new(
        definition.name(),
        dry_run,
        definition.target(),
        definition.buckets().to_vec(),
        now_ms(),
    )
    .with_kind(definition.kind())
    .with_drill_version(env!("CARGO_PKG_VERSION"));

    let mut abort = None;

    if runner_context.is_shutdown() {
        abort = Some(Abort::Cancelled);
    } else if let Some(setup_fn) = definition.setup_fn().filter(|_| !dry_run) {
        let deadline = Instant::now() + config.step_timeout();
        let mut ctx = StepContext::new(runner_context, &mut recorder, "setup", deadline, true);
        if let Err(e) = setup_fn(&mut ctx) {
            log::warn!("Setup for scenario {} failed: {e:?}", definition.name());
            recorder.record_error(format!("setup: {}", describe_error(&e)));
            abort = Some(if runner_context.is_shutdown() {
                Abort::Cancelled
            } else {
                Abort::Setup
            });
        }
    }
    // Setup is pre-incident work, the measured window starts with the first step.
    recorder.restart_clock(now_ms());

    for step in definition.steps() {
        if abort.is_none() && runner_context.is_shutdown() {
            log::warn!("Drill cancelled, skipping remaining steps of {}", definition.name());
            abort = Some(Abort::Cancelled);
        }

        if let Some(abort) = &abort {
            recorder.record_step(StepResult::not_run(
                step.name(),
                step.bucket(),
                step.is_critical(),
                now_ms(),
                abort.reason(),
                dry_run,
            ));
            runner_context.progress().inc(1);
            continue;
        }

        let result = execute_step(
            step,
            runner_context,
            &mut recorder,
            dry_run,
            true,
            config.step_timeout(),
        );

        if result.outcome.is_failure() {
            recorder.record_error(format!("{}: {}", step.name(), result.outcome.detail));

            if runner_context.is_shutdown() {
                abort = Some(Abort::Cancelled);
            } else if step.is_critical() {
                log::error!(
                    "Critical step {} failed, aborting scenario {}",
                    step.name(),
                    definition.name()
                );
                abort = Some(Abort::Critical(step.name().to_string()));
            }
        }

        recorder.record_step(result);
    }

    let cleanup = definition.cleanup();
    let result = execute_step(
        cleanup,
        runner_context,
        &mut recorder,
        dry_run,
        false,
        config.cleanup_timeout(),
    );
    if result.outcome.is_failure() {
        recorder.record_error(format!("{}: {}", cleanup.name(), result.outcome.detail));
    }
    recorder.record_step(result);

    let termination = abort
        .as_ref()
        .map(Abort::termination)
        .unwrap_or(Termination::Completed);
    let scenario_run = recorder.seal(now_ms(), termination);

    runner_context
        .reporter()
        .lock()
        .finalize(definition.name());

    log::info!(
        "Scenario {} {} in {}ms: {}",
        scenario_run.scenario_name(),
        scenario_run.termination(),
        scenario_run.total_duration_ms(),
        scenario_run.compliance_verdict()
    );

    scenario_run
}

/// Record for a scenario whose run escaped step containment.
///
/// The run is sealed as faulted with every declared step recorded as not run. Without a definition
/// there are no declared steps to record.
pub(crate) fn faulted_run(
    scenario_name: &str,
    definition: Option<&ScenarioDefinition>,
    fallback_target: drill_summary_model::ComplianceTarget,
    dry_run: bool,
    started_at: i64,
    error: String,
) -> ScenarioRun {
    log::error!("Scenario {scenario_name} faulted: {error}");

    let (target, buckets) = match definition {
        Some(definition) => (definition.target(), definition.buckets().to_vec()),
        None => (fallback_target, Vec::new()),
    };

    let mut recorder = ScenarioRunRecorder::new(scenario_name, dry_run, target, buckets, started_at)
        .with_drill_version(env!("CARGO_PKG_VERSION"));
    if let Some(definition) = definition {
        recorder = recorder.with_kind(definition.kind());
        let at = now_ms();
        for step in definition
            .steps()
            .iter()
            .chain(std::iter::once(definition.cleanup()))
        {
            recorder.record_step(StepResult::not_run(
                step.name(),
                step.bucket(),
                step.is_critical(),
                at,
                "not run: scenario faulted",
                dry_run,
            ));
        }
    }
    recorder.record_error(error);

    recorder.seal(now_ms(), Termination::Faulted)
}

/// Build a definition, containing errors and panics from the factory.
pub(crate) fn build_contained<F>(build: F) -> Result<ScenarioDefinition, String>
where
    F: FnOnce() -> crate::types::DrillResult<ScenarioDefinition>,
{
    match catch_unwind(AssertUnwindSafe(build)) {
        Ok(Ok(definition)) => Ok(definition),
        Ok(Err(e)) => Err(format!("failed to build scenario definition: {e:#}")),
        Err(panic) => Err(format!(
            "scenario definition panicked: {}",
            panic_message(panic.as_ref())
        )),
    }
}
