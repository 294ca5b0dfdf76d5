//! Records produced by recovery drills.
//!
//! A [ScenarioRun] is built through a [ScenarioRunRecorder] while a scenario executes and is sealed
//! once the scenario finishes. Sealed runs are read-only, they are persisted by the
//! [MetricsStore] and folded into a [SuiteRun] by the orchestrator.

mod compliance;
mod outcome;
mod scenario_run;
mod store;
mod suite_run;

pub use compliance::{
    suite_verdict, validate, validate_duration, Assessment, ComplianceMetric, ComplianceTarget,
    Verdict,
};
pub use outcome::{Outcome, StepResult, StepStatus};
pub use scenario_run::{
    shape_fingerprint, BucketDuration, ScenarioRun, ScenarioRunRecorder, Termination,
    REQUIRED_FIELDS,
};
pub use store::{MetricsStore, StoreError};
pub use suite_run::{ScenarioRunRef, SuiteRecord, SuiteRun};

/// Format used for timestamps in record ids and file names, e.g. `20260101T120000123Z`.
pub const TIMESTAMP_ID_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// Render a Unix millisecond timestamp with [TIMESTAMP_ID_FORMAT].
pub fn timestamp_id(epoch_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms)
        .map(|t| t.format(TIMESTAMP_ID_FORMAT).to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}
