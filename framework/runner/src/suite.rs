use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use drill_core::prelude::ShutdownHandle;
use drill_instruments::{now_ms, InMemoryReporter, NoopReporter, ReportCollector};
use drill_probes::prelude::Probes;
use drill_summary_model::{
    timestamp_id, ComplianceTarget, MetricsStore, ScenarioRun, SuiteRecord, SuiteRun,
};

use crate::config::DrillConfig;
use crate::context::RunnerContext;
use crate::definition::ScenarioDefinition;
use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::progress::step_progress;
use crate::run::{build_contained, faulted_run, run_scenario};
use crate::shutdown::start_shutdown_listener;
use crate::step::panic_message;
use crate::types::DrillResult;

/// Builds a scenario definition from the drill configuration.
pub type ScenarioFactory =
    Arc<dyn Fn(&DrillConfig) -> DrillResult<ScenarioDefinition> + Send + Sync>;

/// The scenarios a drill binary knows about, by name.
#[derive(Clone, Default)]
pub struct ScenarioRegistry {
    factories: BTreeMap<String, ScenarioFactory>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&DrillConfig) -> DrillResult<ScenarioDefinition> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ScenarioFactory> {
        self.factories.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReporterKind {
    /// Print a per-bucket table after each scenario.
    #[default]
    InMemory,
    Noop,
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub reporter: ReporterKind,
    pub progress: bool,
    /// Cancel the drill on Ctrl-C.
    pub handle_signals: bool,
    /// Warn when the drill process itself uses a lot of CPU.
    pub monitor: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            reporter: ReporterKind::InMemory,
            progress: true,
            handle_signals: true,
            monitor: true,
        }
    }
}

/// Runs scenarios, alone or as a suite, strictly one after the other.
///
/// Each scenario runs on its own named thread which is joined straight away, so a panic that
/// escapes a scenario is contained and recorded as a faulted run while the suite carries on. Every
/// sealed run is persisted as soon as it completes.
pub struct Orchestrator {
    runner_context: RunnerContext,
    registry: ScenarioRegistry,
    store: MetricsStore,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(
        config: Arc<DrillConfig>,
        registry: ScenarioRegistry,
        probes: Arc<dyn Probes>,
        options: RunOptions,
    ) -> DrillResult<Self> {
        let store = MetricsStore::open(&config.store_dir).with_context(|| {
            format!(
                "Failed to open metrics store at {}",
                config.store_dir.display()
            )
        })?;

        let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
        let shutdown_handle = ShutdownHandle::default();
        if options.handle_signals {
            start_shutdown_listener(&runtime, shutdown_handle.clone());
        }
        let executor = Arc::new(Executor::new(runtime, shutdown_handle));

        let reporter: Box<dyn ReportCollector> = match options.reporter {
            ReporterKind::InMemory => Box::new(InMemoryReporter::new()),
            ReporterKind::Noop => Box::new(NoopReporter),
        };

        Ok(Self {
            runner_context: RunnerContext::new(executor, config, probes, reporter),
            registry,
            store,
            options,
        })
    }

    pub fn config(&self) -> &DrillConfig {
        self.runner_context.config()
    }

    pub fn store(&self) -> &MetricsStore {
        &self.store
    }

    /// Handle for cancelling the drill programmatically.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.runner_context.shutdown_handle().clone()
    }

    /// Run a configured suite.
    pub fn run_suite(&mut self, suite_name: &str, dry_run: bool) -> DrillResult<SuiteRun> {
        let scenarios = self
            .config()
            .suite(suite_name)
            .map(<[String]>::to_vec)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown suite [{suite_name}], configured suites are: {}",
                    self.config()
                        .suites
                        .keys()
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })?;

        self.run_scenarios(suite_name, scenarios, dry_run)
    }

    /// Run a single scenario as a suite of one, named after the scenario.
    pub fn run_scenario(&mut self, scenario_name: &str, dry_run: bool) -> DrillResult<SuiteRun> {
        if self.registry.get(scenario_name).is_none() {
            anyhow::bail!(
                "Unknown scenario [{scenario_name}], known scenarios are: {}",
                self.registry.names().collect::<Vec<_>>().join(", ")
            );
        }

        self.run_scenarios(scenario_name, vec![scenario_name.to_string()], dry_run)
    }

    fn run_scenarios(
        &mut self,
        suite_name: &str,
        scenarios: Vec<String>,
        dry_run: bool,
    ) -> DrillResult<SuiteRun> {
        let started_at = now_ms();
        let suite_id = format!(
            "{suite_name}-{}-{}",
            timestamp_id(started_at),
            nanoid::nanoid!(8, &SUITE_ID_ALPHABET)
        );
        log::info!(
            "Starting suite {suite_name} ({suite_id}) with scenarios: {}",
            scenarios.join(", ")
        );

        let mut record = SuiteRecord::new(&suite_id, suite_name, dry_run, started_at);
        self.store
            .open_suite(&record)
            .context("Failed to persist suite record")?;

        let definitions = scenarios
            .iter()
            .map(|name| (name.clone(), self.build_definition(name)))
            .collect::<Vec<_>>();
        let total_steps = definitions
            .iter()
            .map(|(_, d)| d.as_ref().map(|d| d.step_count()).unwrap_or(0) as u64)
            .sum();
        self.runner_context
            .set_progress(step_progress(total_steps, self.options.progress));

        let monitor_stop = ShutdownHandle::default();
        if self.options.monitor {
            start_monitor(monitor_stop.new_listener());
        }

        let result = self.run_definitions(&mut record, definitions, dry_run);

        monitor_stop.shutdown();
        self.runner_context.progress().finish_and_clear();

        let (scenario_runs, errors) = result?;
        let cancelled = self.runner_context.is_shutdown();

        let suite_run = SuiteRun::assemble(
            suite_id,
            suite_name,
            dry_run,
            started_at,
            now_ms(),
            cancelled,
            scenario_runs,
            errors,
        );
        self.store
            .close_suite(&mut record, &suite_run)
            .context("Failed to persist suite record")?;

        log::info!(
            "Suite {suite_name} finished with {} scenario runs: {}",
            suite_run.scenario_runs().len(),
            suite_run.compliance_verdict()
        );

        Ok(suite_run)
    }

    fn run_definitions(
        &self,
        record: &mut SuiteRecord,
        definitions: Vec<(String, Result<ScenarioDefinition, String>)>,
        dry_run: bool,
    ) -> DrillResult<(Vec<ScenarioRun>, Vec<String>)> {
        let mut scenario_runs = Vec::new();
        let mut errors = Vec::new();

        for (name, definition) in definitions {
            if self.runner_context.is_shutdown() {
                log::warn!("Drill cancelled, not starting scenario {name}");
                errors.push(format!("cancelled before scenario {name} started"));
                break;
            }

            let scenario_run = match definition {
                Ok(definition) => self.run_contained(&name, definition, dry_run)?,
                Err(error) => {
                    errors.push(format!("{name}: {error}"));
                    faulted_run(
                        &name,
                        None,
                        self.fallback_target(&name),
                        dry_run,
                        now_ms(),
                        error,
                    )
                }
            };

            self.store
                .seal(&scenario_run)
                .with_context(|| format!("Failed to persist scenario run {}", scenario_run.id()))?;
            self.store
                .append(record, &scenario_run)
                .context("Failed to persist suite record")?;

            scenario_runs.push(scenario_run);
        }

        Ok((scenario_runs, errors))
    }

    fn build_definition(&self, name: &str) -> Result<ScenarioDefinition, String> {
        let Some(factory) = self.registry.get(name) else {
            return Err(format!("no scenario named {name} is registered"));
        };

        let config = self.runner_context.config().clone();
        build_contained(|| factory(&config))
    }

    /// Run a scenario on its own thread and join it, turning an escaped panic into a faulted run.
    fn run_contained(
        &self,
        name: &str,
        definition: ScenarioDefinition,
        dry_run: bool,
    ) -> DrillResult<ScenarioRun> {
        let started_at = now_ms();
        let runner_context = &self.runner_context;
        let definition = &definition;

        let joined = std::thread::scope(|scope| {
            let handle = std::thread::Builder::new()
                .name(format!("scenario-{name}"))
                .spawn_scoped(scope, move || {
                    run_scenario(definition, runner_context, dry_run)
                })
                .with_context(|| format!("Failed to spawn thread for scenario {name}"))?;

            Ok::<_, anyhow::Error>(handle.join())
        })?;

        Ok(match joined {
            Ok(scenario_run) => scenario_run,
            Err(panic) => faulted_run(
                name,
                Some(definition),
                definition.target(),
                dry_run,
                started_at,
                format!("scenario panicked: {}", panic_message(panic.as_ref())),
            ),
        })
    }

    fn fallback_target(&self, name: &str) -> ComplianceTarget {
        self.config()
            .target(name)
            .unwrap_or_else(|_| ComplianceTarget::rto(1))
    }
}

const SUITE_ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];
