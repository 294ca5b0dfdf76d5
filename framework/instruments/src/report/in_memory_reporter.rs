mod steps_table;

use crate::report::in_memory_reporter::steps_table::BucketRow;
use crate::report::ReportCollector;
use crate::StepRecord;
use tabled::settings::Style;
use tabled::Table;

/// Keeps every step timeline of a scenario in memory and prints a per-bucket summary once the
/// scenario has finished.
#[derive(Debug, Default)]
pub struct InMemoryReporter {
    step_records: Vec<StepRecord>,
}

impl InMemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bucket_rows(&self) -> Vec<BucketRow> {
        // Buckets in the order they were first seen, which is the declared order.
        let mut rows: Vec<BucketRow> = Vec::new();

        for record in &self.step_records {
            let time_ms = record.duration().map(|d| d.as_secs_f64() * 1000.0).unwrap_or_default();

            let index = match rows.iter().position(|row| row.bucket == record.bucket) {
                Some(index) => index,
                None => {
                    rows.push(BucketRow {
                        bucket: record.bucket.clone(),
                        steps: 0,
                        failed: 0,
                        total_time_ms: 0.0,
                        slowest_step: String::new(),
                        slowest_time_ms: 0.0,
                    });
                    rows.len() - 1
                }
            };
            let row = &mut rows[index];

            row.steps += 1;
            if record.is_error {
                row.failed += 1;
            }
            row.total_time_ms += time_ms;
            if row.slowest_step.is_empty() || time_ms > row.slowest_time_ms {
                row.slowest_step = record.step_name.clone();
                row.slowest_time_ms = time_ms;
            }
        }

        rows
    }
}

impl ReportCollector for InMemoryReporter {
    fn add_step(&mut self, record: &StepRecord) {
        self.step_records.push(record.clone());
    }

    fn finalize(&mut self, scenario_name: &str) {
        if self.step_records.is_empty() {
            log::debug!("No steps were timed for {scenario_name}");
            return;
        }

        println!("\nSummary of steps for {scenario_name}");
        let mut table = Table::new(self.bucket_rows());
        table.with(Style::modern());

        println!("{table}");
        self.step_records.clear();
    }
}
