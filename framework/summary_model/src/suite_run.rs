use serde::{Deserialize, Serialize};

use crate::compliance::{suite_verdict, Verdict};
use crate::scenario_run::ScenarioRun;

/// The result of running a suite of scenarios, in the order they were run.
///
/// A suite run is assembled once the orchestrator has stopped launching scenarios. Its verdict is a
/// pure fold over the verdicts of its scenario runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuiteRun {
    #[serde(default)]
    id: String,
    suite_name: String,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    started_at: i64,
    #[serde(default)]
    ended_at: i64,
    /// Set when the operator cancelled the drill before every scenario was launched.
    #[serde(default)]
    cancelled: bool,
    compliance_verdict: Verdict,
    #[serde(default)]
    scenario_runs: Vec<ScenarioRun>,
    /// Faults caught by the orchestrator, as opposed to errors recorded inside a scenario.
    #[serde(default)]
    errors: Vec<String>,
}

impl SuiteRun {
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        id: impl Into<String>,
        suite_name: impl Into<String>,
        dry_run: bool,
        started_at: i64,
        ended_at: i64,
        cancelled: bool,
        scenario_runs: Vec<ScenarioRun>,
        errors: Vec<String>,
    ) -> Self {
        let verdicts: Vec<Verdict> = scenario_runs
            .iter()
            .map(|run| run.compliance_verdict())
            .collect();
        let compliance_verdict = suite_verdict(&verdicts);

        Self {
            id: id.into(),
            suite_name: suite_name.into(),
            dry_run,
            started_at,
            ended_at: ended_at.max(started_at),
            cancelled,
            compliance_verdict,
            scenario_runs,
            errors,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn suite_name(&self) -> &str {
        &self.suite_name
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn ended_at(&self) -> i64 {
        self.ended_at
    }

    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn compliance_verdict(&self) -> Verdict {
        self.compliance_verdict
    }

    pub fn scenario_runs(&self) -> &[ScenarioRun] {
        &self.scenario_runs
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Every error string in the suite, orchestrator faults first and then each scenario's errors
    /// prefixed with the scenario name.
    pub fn all_errors(&self) -> Vec<String> {
        self.errors
            .iter()
            .cloned()
            .chain(self.scenario_runs.iter().flat_map(|run| {
                run.errors()
                    .iter()
                    .map(move |e| format!("{}: {}", run.scenario_name(), e))
            }))
            .collect()
    }
}

/// Reference from a stored suite to one of its stored scenario runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRunRef {
    pub id: String,
    pub scenario_name: String,
    pub compliance_verdict: Verdict,
    /// Path relative to the store root.
    pub path: String,
}

/// The stored form of a suite run. Scenario runs are stored separately and referenced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SuiteRecord {
    pub id: String,
    pub suite_name: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub started_at: i64,
    /// Not set until the suite has finished.
    #[serde(default)]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub compliance_verdict: Verdict,
    #[serde(default)]
    pub scenarios: Vec<ScenarioRunRef>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl SuiteRecord {
    pub fn new(
        id: impl Into<String>,
        suite_name: impl Into<String>,
        dry_run: bool,
        started_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            suite_name: suite_name.into(),
            dry_run,
            started_at,
            ended_at: None,
            cancelled: false,
            compliance_verdict: Verdict::Unknown,
            scenarios: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }
}
