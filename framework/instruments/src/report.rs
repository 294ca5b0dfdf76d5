mod in_memory_reporter;

use crate::StepRecord;

pub use in_memory_reporter::InMemoryReporter;

/// Receives step timelines as a scenario runs.
///
/// Collectors are live feedback for the operator. The sealed scenario run is the record of truth,
/// so nothing a collector does can change a measurement.
pub trait ReportCollector: Send {
    fn add_step(&mut self, record: &StepRecord);

    /// Called once when the scenario has finished, including cleanup. Collected steps are
    /// released so the collector can be reused for the next scenario.
    fn finalize(&mut self, scenario_name: &str);
}

/// Drops everything, for CI logs and tests.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ReportCollector for NoopReporter {
    fn add_step(&mut self, _record: &StepRecord) {}

    fn finalize(&mut self, _scenario_name: &str) {}
}
