use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
}

/// What happened when a step ran.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub status: StepStatus,
    #[serde(default)]
    pub detail: String,
    /// Time spent inside the step's action, in milliseconds.
    #[serde(default)]
    pub measured_ms: u64,
    /// Set when the step ran its simulated action. Simulated timings are nominal pacing and not
    /// measurements of the system under test.
    #[serde(default)]
    pub simulated: bool,
}

impl Outcome {
    pub fn success(detail: impl Into<String>, measured_ms: u64, simulated: bool) -> Self {
        Self {
            status: StepStatus::Success,
            detail: detail.into(),
            measured_ms,
            simulated,
        }
    }

    pub fn failure(detail: impl Into<String>, measured_ms: u64, simulated: bool) -> Self {
        Self {
            status: StepStatus::Failure,
            detail: detail.into(),
            measured_ms,
            simulated,
        }
    }

    pub fn skipped(detail: impl Into<String>, measured_ms: u64, simulated: bool) -> Self {
        Self {
            status: StepStatus::Skipped,
            detail: detail.into(),
            measured_ms,
            simulated,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == StepStatus::Failure
    }
}

/// One entry of a scenario run's timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub name: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub critical: bool,
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    pub started_at: i64,
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    pub ended_at: i64,
    pub outcome: Outcome,
}

impl StepResult {
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        critical: bool,
        started_at: i64,
        ended_at: i64,
        outcome: Outcome,
    ) -> Self {
        Self {
            name: name.into(),
            bucket: bucket.into(),
            critical,
            started_at,
            ended_at,
            outcome,
        }
    }

    /// A step that was never started, for example because an earlier critical step failed.
    pub fn not_run(
        name: impl Into<String>,
        bucket: impl Into<String>,
        critical: bool,
        at: i64,
        reason: impl Into<String>,
        simulated: bool,
    ) -> Self {
        Self::new(
            name,
            bucket,
            critical,
            at,
            at,
            Outcome::skipped(reason, 0, simulated),
        )
    }
}
