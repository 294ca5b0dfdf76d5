use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha3::Digest;

use crate::compliance::{validate_duration, ComplianceMetric, ComplianceTarget, Verdict};
use crate::outcome::StepResult;
use crate::timestamp_id;

/// Fields a reader must find in a stored scenario run. Everything else is optional so that older
/// and newer records can be read.
pub const REQUIRED_FIELDS: [&str; 3] = ["scenarioName", "totalDurationMs", "complianceVerdict"];

/// How a scenario run ended.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Termination {
    /// Every step was attempted.
    #[default]
    Completed,
    /// A critical step or the setup failed, the remaining steps were skipped.
    Aborted,
    /// The operator cancelled the drill.
    Cancelled,
    /// The scenario crashed outside of step containment.
    Faulted,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Completed => write!(f, "completed"),
            Termination::Aborted => write!(f, "aborted"),
            Termination::Cancelled => write!(f, "cancelled"),
            Termination::Faulted => write!(f, "faulted"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketDuration {
    pub bucket: String,
    pub duration_ms: u64,
}

/// A sealed, read-only record of one scenario execution.
///
/// `total_duration_ms` is the wall clock time between `started_at` and `ended_at`. It is not the
/// sum of the step timings, the gap between the two is time spent between steps and is kept as it
/// is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioRun {
    #[serde(default)]
    id: String,
    scenario_name: String,
    /// Scenario variant, e.g. `failover`. Defaults to the scenario name.
    #[serde(default)]
    kind: String,
    #[serde(default)]
    dry_run: bool,
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    started_at: i64,
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    ended_at: i64,
    #[serde(default)]
    step_results: Vec<StepResult>,
    /// Sum of step timings per bucket, in declaration order.
    #[serde(default)]
    bucket_durations: Vec<BucketDuration>,
    total_duration_ms: u64,
    #[serde(default)]
    compliance_metric: ComplianceMetric,
    #[serde(default)]
    compliance_target_ms: u64,
    compliance_verdict: Verdict,
    #[serde(default)]
    compliance_margin_pct: Option<f64>,
    #[serde(default)]
    termination: Termination,
    #[serde(default)]
    errors: Vec<String>,
    /// Free form values recorded by steps, e.g. the size of a downloaded backup.
    #[serde(default)]
    details: BTreeMap<String, serde_json::Value>,
    /// See [shape_fingerprint].
    #[serde(default)]
    fingerprint: String,
    #[serde(default)]
    drill_version: String,
}

impl ScenarioRun {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    pub fn kind(&self) -> &str {
        &self.kind
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

    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    pub fn bucket_durations(&self) -> &[BucketDuration] {
        &self.bucket_durations
    }

    pub fn bucket_duration(&self, bucket: &str) -> Option<u64> {
        self.bucket_durations
            .iter()
            .find(|b| b.bucket == bucket)
            .map(|b| b.duration_ms)
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    /// Sum of all step timings. Never more than [ScenarioRun::total_duration_ms] for a run that
    /// was measured by the step executor.
    pub fn summed_step_ms(&self) -> u64 {
        self.bucket_durations.iter().map(|b| b.duration_ms).sum()
    }

    pub fn compliance_metric(&self) -> ComplianceMetric {
        self.compliance_metric
    }

    pub fn compliance_target_ms(&self) -> u64 {
        self.compliance_target_ms
    }

    pub fn compliance_verdict(&self) -> Verdict {
        self.compliance_verdict
    }

    pub fn compliance_margin_pct(&self) -> Option<f64> {
        self.compliance_margin_pct
    }

    pub fn termination(&self) -> Termination {
        self.termination
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn details(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.details
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn drill_version(&self) -> &str {
        &self.drill_version
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.step_results.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Fingerprint of the shape of a scenario: its name, bucket order and the ordered step names.
///
/// Two dry runs of the same scenario must have the same fingerprint. Timings are not part of it.
/// The fingerprint is computed using [sha3::Sha3_256].
pub fn shape_fingerprint<'a>(
    scenario_name: &str,
    buckets: impl IntoIterator<Item = &'a str>,
    steps: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> String {
    let mut hasher = sha3::Sha3_256::new();
    Digest::update(&mut hasher, scenario_name.as_bytes());
    for bucket in buckets {
        Digest::update(&mut hasher, b"\x00bucket\x00");
        Digest::update(&mut hasher, bucket.as_bytes());
    }
    for (bucket, step) in steps {
        Digest::update(&mut hasher, b"\x00step\x00");
        Digest::update(&mut hasher, bucket.as_bytes());
        Digest::update(&mut hasher, b"\x00");
        Digest::update(&mut hasher, step.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

/// The open, appendable form of a [ScenarioRun].
///
/// Only the scenario runner holds a recorder. Sealing consumes it, so a run cannot be changed once
/// it has been sealed.
#[derive(Debug)]
pub struct ScenarioRunRecorder {
    scenario_name: String,
    kind: String,
    dry_run: bool,
    started_at: i64,
    target: ComplianceTarget,
    buckets: Vec<String>,
    step_results: Vec<StepResult>,
    errors: Vec<String>,
    details: BTreeMap<String, serde_json::Value>,
    drill_version: String,
}

impl ScenarioRunRecorder {
    pub fn new(
        scenario_name: impl Into<String>,
        dry_run: bool,
        target: ComplianceTarget,
        buckets: Vec<String>,
        started_at: i64,
    ) -> Self {
        let scenario_name = scenario_name.into();
        Self {
            kind: scenario_name.clone(),
            scenario_name,
            dry_run,
            started_at,
            target,
            buckets,
            step_results: Vec::new(),
            errors: Vec::new(),
            details: BTreeMap::new(),
            drill_version: String::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_drill_version(mut self, drill_version: impl Into<String>) -> Self {
        self.drill_version = drill_version.into();
        self
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    /// Move the start of the measured window to `at`, e.g. once pre-incident checks are done.
    pub fn restart_clock(&mut self, at: i64) {
        self.started_at = at;
    }

    /// Append a step result. Results are kept in the order they are recorded.
    pub fn record_step(&mut self, step_result: StepResult) {
        self.step_results.push(step_result);
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn record_detail(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.details.insert(key.into(), value);
    }

    /// A detail recorded earlier in the run, used to hand values from one step to the next.
    pub fn detail(&self, key: &str) -> Option<&serde_json::Value> {
        self.details.get(key)
    }

    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    /// Seal the run at `ended_at` (Unix milliseconds).
    ///
    /// The verdict follows from how the run ended. Completed runs are validated against the
    /// target. Aborted and faulted runs did not recover and are non-compliant whatever their
    /// timing. Cancelled runs certify nothing and are unknown.
    pub fn seal(self, ended_at: i64, termination: Termination) -> ScenarioRun {
        let ended_at = ended_at.max(self.started_at);
        let total_duration_ms = u64::try_from(ended_at - self.started_at).unwrap_or_default();

        let bucket_durations = self.bucket_durations();

        let assessment = validate_duration(total_duration_ms, &self.target);
        let (compliance_verdict, compliance_margin_pct) = match termination {
            Termination::Completed => (assessment.verdict, assessment.margin_pct),
            Termination::Aborted => (Verdict::NonCompliant, assessment.margin_pct),
            Termination::Faulted => (Verdict::NonCompliant, None),
            Termination::Cancelled => (Verdict::Unknown, None),
        };

        let fingerprint = shape_fingerprint(
            &self.scenario_name,
            self.buckets.iter().map(String::as_str),
            self.step_results
                .iter()
                .map(|s| (s.bucket.as_str(), s.name.as_str())),
        );

        ScenarioRun {
            id: format!("{}-{}", self.scenario_name, timestamp_id(self.started_at)),
            scenario_name: self.scenario_name,
            kind: self.kind,
            dry_run: self.dry_run,
            started_at: self.started_at,
            ended_at,
            step_results: self.step_results,
            bucket_durations,
            total_duration_ms,
            compliance_metric: self.target.metric,
            compliance_target_ms: self.target.threshold_ms(),
            compliance_verdict,
            compliance_margin_pct,
            termination,
            errors: self.errors,
            details: self.details,
            fingerprint,
            drill_version: self.drill_version,
        }
    }

    fn bucket_durations(&self) -> Vec<BucketDuration> {
        let mut durations: Vec<BucketDuration> = self
            .buckets
            .iter()
            .map(|bucket| BucketDuration {
                bucket: bucket.clone(),
                duration_ms: 0,
            })
            .collect();

        for step in &self.step_results {
            match durations.iter_mut().find(|d| d.bucket == step.bucket) {
                Some(d) => d.duration_ms += step.outcome.measured_ms,
                None => {
                    // A step in a bucket that was never declared, keep it visible at the end.
                    durations.push(BucketDuration {
                        bucket: step.bucket.clone(),
                        duration_ms: step.outcome.measured_ms,
                    })
                }
            }
        }

        durations
    }
}
