use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use drill_core::prelude::ShutdownHandle;
use drill_instruments::ReportCollector;
use drill_probes::prelude::Probes;
use drill_summary_model::ScenarioRunRecorder;
use indicatif::ProgressBar;
use parking_lot::Mutex;

use crate::config::DrillConfig;
use crate::executor::Executor;
use crate::types::DrillResult;

/// Everything that is shared by all scenarios of a drill.
pub struct RunnerContext {
    executor: Arc<Executor>,
    config: Arc<DrillConfig>,
    probes: Arc<dyn Probes>,
    reporter: Arc<Mutex<Box<dyn ReportCollector>>>,
    progress: ProgressBar,
}

impl RunnerContext {
    pub(crate) fn new(
        executor: Arc<Executor>,
        config: Arc<DrillConfig>,
        probes: Arc<dyn Probes>,
        reporter: Box<dyn ReportCollector>,
    ) -> Self {
        Self {
            executor,
            config,
            probes,
            reporter: Arc::new(Mutex::new(reporter)),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn config(&self) -> &Arc<DrillConfig> {
        &self.config
    }

    pub fn probes(&self) -> &Arc<dyn Probes> {
        &self.probes
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        self.executor.shutdown_handle()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_handle().is_shutdown()
    }

    pub(crate) fn reporter(&self) -> &Arc<Mutex<Box<dyn ReportCollector>>> {
        &self.reporter
    }

    pub(crate) fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    pub(crate) fn set_progress(&mut self, progress: ProgressBar) {
        self.progress = progress;
    }
}

/// The context a step action, setup hook or cleanup runs with.
///
/// Async work must go through [StepContext::execute] so that it is bounded by the step deadline and
/// abandoned when the drill is cancelled.
pub struct StepContext<'a> {
    runner_context: &'a RunnerContext,
    recorder: &'a mut ScenarioRunRecorder,
    step_name: &'a str,
    deadline: Instant,
    cancellable: bool,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        runner_context: &'a RunnerContext,
        recorder: &'a mut ScenarioRunRecorder,
        step_name: &'a str,
        deadline: Instant,
        cancellable: bool,
    ) -> Self {
        Self {
            runner_context,
            recorder,
            step_name,
            deadline,
            cancellable,
        }
    }

    pub fn runner_context(&self) -> &RunnerContext {
        self.runner_context
    }

    pub fn config(&self) -> &DrillConfig {
        self.runner_context.config()
    }

    pub fn probes(&self) -> &dyn Probes {
        self.runner_context.probes().as_ref()
    }

    pub fn step_name(&self) -> &str {
        self.step_name
    }

    /// Run async code bounded by the step deadline.
    pub fn execute<T>(&self, fut: impl Future<Output = DrillResult<T>>) -> DrillResult<T> {
        self.runner_context
            .executor()
            .execute_bounded(fut, self.deadline, self.cancellable)
    }

    /// Time left before the step deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Wait for the configured settle time, bounded by the step deadline.
    pub fn settle(&self) -> DrillResult<()> {
        let settle = self.config().settle();
        self.execute(async move {
            tokio::time::sleep(settle).await;
            Ok(())
        })
    }

    /// Record a structured value on the scenario run.
    pub fn record_detail(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.recorder.record_detail(key, value.into());
    }

    /// A value recorded by an earlier step of the same run.
    pub fn detail(&self, key: &str) -> Option<&serde_json::Value> {
        self.recorder.detail(key)
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.detail(key).and_then(serde_json::Value::as_str)
    }
}
