mod report;

use std::time::{Duration, Instant};

pub use report::{InMemoryReporter, NoopReporter, ReportCollector};

/// Wall clock time as milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The timeline of a single step.
///
/// A record is created before the step runs and is stamped by a [StepTimer]. The start is stamped
/// when the timer is taken and the end when the timer is dropped, so the end time is present on
/// every exit path, including unwinding out of a panicking step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step_name: String,
    pub bucket: String,
    /// Unix timestamp in milliseconds, set when the timer is started.
    pub started_at_ms: i64,
    /// Unix timestamp in milliseconds, set when the timer is dropped.
    pub ended_at_ms: Option<i64>,
    pub elapsed: Option<Duration>,
    pub is_error: bool,
}

impl StepRecord {
    pub fn new(step_name: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            bucket: bucket.into(),
            started_at_ms: 0,
            ended_at_ms: None,
            elapsed: None,
            is_error: false,
        }
    }

    /// Start timing the step. The returned guard must be held for as long as the step runs.
    pub fn start(&mut self) -> StepTimer<'_> {
        self.started_at_ms = now_ms();
        self.ended_at_ms = None;
        self.elapsed = None;
        self.is_error = false;

        StepTimer {
            record: self,
            started: Instant::now(),
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Measured duration in whole milliseconds, zero if the step was never timed.
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Scoped timer for a [StepRecord].
pub struct StepTimer<'a> {
    record: &'a mut StepRecord,
    started: Instant,
}

impl StepTimer<'_> {
    pub fn mark_error(&mut self) {
        self.record.is_error = true;
    }
}

impl Drop for StepTimer<'_> {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        let ended_at_ms = now_ms();

        // Monotonic elapsed time is the measurement, the wall clock end is only kept consistent
        // with it so that a clock step backwards cannot produce an end before the start.
        self.record.elapsed = Some(elapsed);
        self.record.ended_at_ms = Some(ended_at_ms.max(self.record.started_at_ms));
    }
}
