//! The operator facing side of the drill: which scenarios exist and what each subcommand does.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use drill_probes::prelude::Probes;
use drill_report::{render, ReportFormat};
use drill_runner::prelude::*;
use drill_summary_model::{MetricsStore, SuiteRecord, SuiteRun, Verdict};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Every scenario this binary can run.
pub fn registry() -> ScenarioRegistry {
    ScenarioRegistry::new()
        .register(failover::NAME, failover::definition)
        .register(restore::NAME, restore::definition)
        .register(service_recovery::NAME, service_recovery::definition)
        .register(health_probe::NAME, health_probe::definition)
}

/// Process exit code for a suite verdict.
pub fn exit_code(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Compliant => 0,
        Verdict::NonCompliant => 1,
        Verdict::Unknown => 2,
    }
}

/// Exit code for anything that stopped the drill from producing a verdict.
pub const OPERATIONAL_ERROR: u8 = 2;

pub fn report_format(format: ReportFormatOpt) -> ReportFormat {
    match format {
        ReportFormatOpt::Json => ReportFormat::Json,
        ReportFormatOpt::Html => ReportFormat::Html,
        ReportFormatOpt::Text => ReportFormat::Text,
    }
}

/// `drill run`: run a suite or a single scenario and write the report.
pub fn run(
    args: &RunArgs,
    config: Arc<DrillConfig>,
    probes: Arc<dyn Probes>,
) -> DrillResult<SuiteRun> {
    let options = RunOptions {
        reporter: args.reporter.into(),
        progress: !args.no_progress,
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(config, registry(), probes, options)?;

    let suite_run = match args.target() {
        RunTarget::Suite(suite) => orchestrator.run_suite(&suite, args.dry_run)?,
        RunTarget::Scenario(scenario) => orchestrator.run_scenario(&scenario, args.dry_run)?,
    };

    let report = render(&suite_run, report_format(args.format))?;
    write_output(&report, args.output.as_deref())?;

    Ok(suite_run)
}

/// `drill report`: render a stored suite, the most recent one unless an id is given.
pub fn report(args: &ReportArgs, config: &DrillConfig) -> DrillResult<SuiteRun> {
    let store = MetricsStore::open(&config.store_dir)?;

    let suite_id = match &args.suite_id {
        Some(id) => id.clone(),
        None => latest_suite(&store)?
            .map(|record| record.id)
            .ok_or_else(|| {
                anyhow::anyhow!("No stored suites in {}", config.store_dir.display())
            })?,
    };

    let suite_run = store
        .load_suite(&suite_id)
        .with_context(|| format!("Failed to load suite {suite_id}"))?;

    let report = render(&suite_run, report_format(args.format))?;
    write_output(&report, args.output.as_deref())?;

    Ok(suite_run)
}

/// The most recently started stored suite.
pub fn latest_suite(store: &MetricsStore) -> DrillResult<Option<SuiteRecord>> {
    Ok(store.list_suites()?.pop())
}

#[derive(Tabled)]
struct StoredSuiteRow {
    id: String,
    suite: String,
    verdict: String,
    scenarios: usize,
    #[tabled(rename = "dry run")]
    dry_run: bool,
    state: String,
}

#[derive(Tabled)]
struct ConfiguredSuiteRow {
    suite: String,
    scenarios: String,
}

/// `drill list`: the stored suites, oldest first, and the configured suites.
pub fn list(config: &DrillConfig) -> DrillResult<String> {
    let store = MetricsStore::open(&config.store_dir)?;
    let stored = store.list_suites()?;

    let mut out = String::new();
    if stored.is_empty() {
        out.push_str(&format!(
            "No stored suites in {}\n",
            config.store_dir.display()
        ));
    } else {
        let rows = stored.into_iter().map(|record| StoredSuiteRow {
            state: match (record.is_finished(), record.cancelled) {
                (false, _) => "unfinished".to_string(),
                (true, true) => "cancelled".to_string(),
                (true, false) => "finished".to_string(),
            },
            scenarios: record.scenarios.len(),
            verdict: record.compliance_verdict.to_string(),
            dry_run: record.dry_run,
            suite: record.suite_name,
            id: record.id,
        });
        out.push_str(&format!(
            "Stored suites\n{}\n",
            Table::new(rows).with(Style::modern())
        ));
    }

    let rows = config.suites.iter().map(|(suite, scenarios)| ConfiguredSuiteRow {
        suite: suite.clone(),
        scenarios: scenarios.join(", "),
    });
    out.push_str(&format!(
        "\nConfigured suites\n{}\n",
        Table::new(rows).with(Style::modern())
    ));

    Ok(out)
}

fn write_output(bytes: &[u8], output: Option<&Path>) -> DrillResult<()> {
    match output {
        Some(path) => {
            std::fs::write(path, bytes)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            log::info!("Wrote report to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(bytes)
                .and_then(|_| stdout.flush())
                .context("Failed to write report to stdout")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_verdict() {
        assert_eq!(0, exit_code(Verdict::Compliant));
        assert_eq!(1, exit_code(Verdict::NonCompliant));
        assert_eq!(2, exit_code(Verdict::Unknown));
    }

    #[test]
    fn every_configured_scenario_is_registered() {
        let config = DrillConfig::defaults().unwrap();
        let registry = registry();

        for scenarios in config.suites.values() {
            for scenario in scenarios {
                assert!(registry.get(scenario).is_some(), "{scenario} is not registered");
            }
        }
    }

    #[test]
    fn every_scenario_builds_from_defaults() {
        let config = DrillConfig::defaults().unwrap();
        let registry = registry();

        for name in registry.names() {
            let definition = registry.get(name).unwrap()(&config).unwrap();
            assert_eq!(name, definition.name());
        }
    }
}
