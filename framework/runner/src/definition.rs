use std::collections::HashSet;

use drill_summary_model::{shape_fingerprint, ComplianceTarget};

use crate::context::StepContext;
use crate::step::{simulated, ActionResult, Completion, Simulation, Step, StepAction};
use crate::types::DrillResult;

pub type HookResult = anyhow::Result<()>;

pub type SetupHook = fn(&mut StepContext<'_>) -> HookResult;

/// Bucket that holds the cleanup step. It is always last and cannot be declared.
pub const CLEANUP_BUCKET: &str = "cleanup";

/// The builder for a scenario definition.
pub struct ScenarioDefinitionBuilder {
    /// The name of the scenario, which must be unique within a drill. It is also the key of the
    /// scenario's compliance target in the configuration.
    name: String,
    /// Scenario variant, defaults to the name.
    kind: String,
    target: ComplianceTarget,
    /// Timing buckets in execution order.
    buckets: Vec<String>,
    steps: Vec<Step>,
    /// Setup hook, run once before the first step and only for real runs. Use it to check that the
    /// environment is in a state the scenario can start from.
    setup_fn: Option<SetupHook>,
    /// The terminal step, which runs on every exit path.
    cleanup: Option<Step>,
}

/// A validated scenario. Steps are in execution order: bucket order, then insertion order.
pub struct ScenarioDefinition {
    name: String,
    kind: String,
    target: ComplianceTarget,
    buckets: Vec<String>,
    steps: Vec<Step>,
    setup_fn: Option<SetupHook>,
    cleanup: Step,
}

impl ScenarioDefinitionBuilder {
    pub fn new(name: &str, target: ComplianceTarget) -> Self {
        Self {
            name: name.to_string(),
            kind: name.to_string(),
            target,
            buckets: Vec::new(),
            steps: Vec::new(),
            setup_fn: None,
            cleanup: None,
        }
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    /// Declare the timing buckets, in the order they run.
    pub fn with_buckets<I, S>(mut self, buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.buckets = buckets.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: SetupHook) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the cleanup step [ScenarioDefinitionBuilder::cleanup] for this scenario.
    pub fn use_cleanup(
        mut self,
        name: &str,
        action: impl StepAction + 'static,
        simulation: Simulation,
    ) -> Self {
        self.cleanup = Some(Step::new(name, CLEANUP_BUCKET, action, simulation));
        self
    }

    pub fn build(self) -> DrillResult<ScenarioDefinition> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Scenario name must not be empty");
        }
        if self.target.threshold_seconds == 0 {
            anyhow::bail!("Scenario [{}] needs a positive compliance threshold", self.name);
        }

        let mut seen_buckets = HashSet::new();
        for bucket in &self.buckets {
            if bucket == CLEANUP_BUCKET {
                anyhow::bail!(
                    "Scenario [{}] declares the reserved bucket [{CLEANUP_BUCKET}]",
                    self.name
                );
            }
            if !seen_buckets.insert(bucket.as_str()) {
                anyhow::bail!("Scenario [{}] declares bucket [{bucket}] twice", self.name);
            }
        }

        let cleanup = self
            .cleanup
            .unwrap_or_else(|| {
                Step::new(
                    "cleanup",
                    CLEANUP_BUCKET,
                    nothing_to_clean_up,
                    simulated(0, "nothing to clean up"),
                )
            })
            .with_bucket(CLEANUP_BUCKET);

        let mut seen_steps = HashSet::new();
        for step in self.steps.iter().chain(std::iter::once(&cleanup)) {
            if !seen_steps.insert(step.name()) {
                anyhow::bail!(
                    "Step [{}] is already defined in scenario [{}]",
                    step.name(),
                    self.name
                );
            }
        }

        if let Some(step) = self
            .steps
            .iter()
            .find(|step| !self.buckets.iter().any(|b| b == step.bucket()))
        {
            anyhow::bail!(
                "Step [{}] uses bucket [{}] which scenario [{}] does not declare",
                step.name(),
                step.bucket(),
                self.name
            );
        }

        let mut steps = self.steps;
        // Stable, so insertion order is kept within a bucket.
        steps.sort_by_key(|step| {
            self.buckets
                .iter()
                .position(|b| b == step.bucket())
                .unwrap_or(usize::MAX)
        });

        let mut buckets = self.buckets;
        buckets.push(CLEANUP_BUCKET.to_string());

        Ok(ScenarioDefinition {
            name: self.name,
            kind: self.kind,
            target: self.target,
            buckets,
            steps,
            setup_fn: self.setup_fn,
            cleanup,
        })
    }
}

impl ScenarioDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn target(&self) -> ComplianceTarget {
        self.target
    }

    /// Declared buckets followed by the cleanup bucket.
    pub fn buckets(&self) -> &[String] {
        &self.buckets
    }

    /// Steps in execution order, without the cleanup step.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn cleanup(&self) -> &Step {
        &self.cleanup
    }

    pub fn setup_fn(&self) -> Option<SetupHook> {
        self.setup_fn
    }

    /// Number of step results every run of this scenario records, cleanup included.
    pub fn step_count(&self) -> usize {
        self.steps.len() + 1
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps
            .iter()
            .chain(std::iter::once(&self.cleanup))
            .map(Step::name)
            .collect()
    }

    /// The fingerprint every run of this scenario is sealed with.
    pub fn fingerprint(&self) -> String {
        shape_fingerprint(
            &self.name,
            self.buckets.iter().map(String::as_str),
            self.steps
                .iter()
                .chain(std::iter::once(&self.cleanup))
                .map(|s| (s.bucket(), s.name())),
        )
    }
}

fn nothing_to_clean_up(_: &mut StepContext<'_>) -> ActionResult {
    Ok(Completion::skipped("nothing to clean up"))
}
