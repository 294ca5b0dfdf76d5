use drill_summary_model::ScenarioRun;

/// `850ms` below a second, `7.20s` above.
pub(crate) fn duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.2}s", ms as f64 / 1000.0)
    }
}

pub(crate) fn margin(margin_pct: Option<f64>) -> String {
    match margin_pct {
        Some(pct) => format!("{pct:+.1}%"),
        None => "n/a".to_string(),
    }
}

pub(crate) fn timestamp(epoch_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(epoch_ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

/// The stored target, e.g. `RTO 900s`.
pub(crate) fn target(scenario_run: &ScenarioRun) -> String {
    format!(
        "{} {}",
        scenario_run.compliance_metric(),
        duration(scenario_run.compliance_target_ms())
    )
}

/// Share of the scenario's wall clock time spent in a bucket.
pub(crate) fn share_pct(duration_ms: u64, total_ms: u64) -> f64 {
    if total_ms == 0 {
        return 0.0;
    }

    duration_ms as f64 / total_ms as f64 * 100.0
}
