use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use drill_core::prelude::{ShutdownSignalError, TimeoutError};
use drill_instruments::StepRecord;
use drill_summary_model::{Outcome, ScenarioRunRecorder, StepResult};

use crate::context::{RunnerContext, StepContext};
use crate::types::DrillResult;

/// What a step reports when its action returns normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The step did its work, with a short description of what was observed.
    Done(String),
    /// The step decided there was nothing to do, e.g. a cleanup with nothing to clean up.
    Skipped(String),
}

impl Completion {
    pub fn done(detail: impl Into<String>) -> Self {
        Completion::Done(detail.into())
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Completion::Skipped(detail.into())
    }
}

pub type ActionResult = DrillResult<Completion>;

/// The real action of a step.
pub trait StepAction: Send + Sync {
    fn run(&self, ctx: &mut StepContext<'_>) -> ActionResult;
}

impl<F> StepAction for F
where
    F: Fn(&mut StepContext<'_>) -> ActionResult + Send + Sync,
{
    fn run(&self, ctx: &mut StepContext<'_>) -> ActionResult {
        self(ctx)
    }
}

/// The dry-run stand in for a step's action.
///
/// A simulation is data rather than code, so a dry run cannot reach the environment. It waits for
/// its nominal duration, scaled by the configured pacing, and reports its detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Simulation {
    nominal: Duration,
    detail: String,
}

impl Simulation {
    pub fn new(nominal_ms: u64, detail: impl Into<String>) -> Self {
        Self {
            nominal: Duration::from_millis(nominal_ms),
            detail: detail.into(),
        }
    }

    pub fn nominal(&self) -> Duration {
        self.nominal
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Shorthand for [Simulation::new].
pub fn simulated(nominal_ms: u64, detail: impl Into<String>) -> Simulation {
    Simulation::new(nominal_ms, detail)
}

/// A named, timed operation within a scenario.
///
/// Both the real action and its simulation are required up front, so every step can be dry run.
#[derive(Clone)]
pub struct Step {
    name: String,
    bucket: String,
    action: Arc<dyn StepAction>,
    simulation: Simulation,
    critical: bool,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("bucket", &self.bucket)
            .field("simulation", &self.simulation)
            .field("critical", &self.critical)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Step {
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        action: impl StepAction + 'static,
        simulation: Simulation,
    ) -> Self {
        Self {
            name: name.into(),
            bucket: bucket.into(),
            action: Arc::new(action),
            simulation,
            critical: false,
            timeout: None,
        }
    }

    /// A failure of a critical step aborts the rest of the scenario. Cleanup still runs.
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Override the configured step deadline for this step.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub(crate) fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }
}

/// Run one step and time it.
///
/// The simulation is used for a dry run, the action otherwise. Errors and panics from the action
/// become a failed outcome. A step that runs past its deadline fails with `timeout` and one that is
/// abandoned because the drill was cancelled fails with `cancelled`.
pub(crate) fn execute_step(
    step: &Step,
    runner_context: &RunnerContext,
    recorder: &mut ScenarioRunRecorder,
    dry_run: bool,
    cancellable: bool,
    default_timeout: Duration,
) -> StepResult {
    let timeout = step.timeout.unwrap_or(default_timeout);
    let mut record = StepRecord::new(step.name(), step.bucket());

    log::info!(
        "Starting step {}/{}{}",
        step.bucket(),
        step.name(),
        if dry_run { " (dry run)" } else { "" }
    );

    let result = {
        let mut timer = record.start();
        let deadline = Instant::now() + timeout;

        let result = if dry_run {
            simulate(step.simulation(), runner_context, deadline, cancellable)
        } else {
            let mut ctx = StepContext::new(
                runner_context,
                recorder,
                step.name(),
                deadline,
                cancellable,
            );
            catch_unwind(AssertUnwindSafe(|| step.action.run(&mut ctx))).unwrap_or_else(
                |panic| {
                    Err(anyhow::anyhow!(
                        "step panicked: {}",
                        panic_message(panic.as_ref())
                    ))
                },
            )
        };

        if result.is_err() {
            timer.mark_error();
        }

        result
    };

    runner_context.reporter().lock().add_step(&record);
    runner_context.progress().inc(1);

    let measured_ms = record.elapsed_ms();
    let outcome = match result {
        Ok(Completion::Done(detail)) => {
            log::info!("Step {} succeeded in {measured_ms}ms", step.name());
            Outcome::success(detail, measured_ms, dry_run)
        }
        Ok(Completion::Skipped(detail)) => {
            log::info!("Step {} skipped: {detail}", step.name());
            Outcome::skipped(detail, measured_ms, dry_run)
        }
        Err(e) => {
            let detail = describe_error(&e);
            log::warn!(
                "Step {} failed after {measured_ms}ms: {e:?}",
                step.name()
            );
            Outcome::failure(detail, measured_ms, dry_run)
        }
    };

    StepResult::new(
        step.name(),
        step.bucket(),
        step.is_critical(),
        record.started_at_ms,
        record.ended_at_ms.unwrap_or(record.started_at_ms),
        outcome,
    )
}

fn simulate(
    simulation: &Simulation,
    runner_context: &RunnerContext,
    deadline: Instant,
    cancellable: bool,
) -> ActionResult {
    let pause = runner_context.config().paced(simulation.nominal());
    if !pause.is_zero() {
        runner_context.executor().execute_bounded(
            async move {
                tokio::time::sleep(pause).await;
                Ok(())
            },
            deadline,
            cancellable,
        )?;
    }

    Ok(Completion::done(simulation.detail()))
}

/// Outcome detail for a failed step. Timeouts and cancellation are reported by name, anything else
/// with its full context chain.
pub(crate) fn describe_error(error: &anyhow::Error) -> String {
    if error.chain().any(|e| e.is::<TimeoutError>()) {
        "timeout".to_string()
    } else if error.chain().any(|e| e.is::<ShutdownSignalError>()) {
        "cancelled".to_string()
    } else {
        format!("{error:#}")
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
