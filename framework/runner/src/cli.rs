use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::suite::ReporterKind;

#[derive(Debug, Parser)]
#[command(name = "drill", version, about, long_about = None)]
pub struct DrillCli {
    /// Path to the drill configuration file. Falls back to `DRILL_CONFIG`, then to the defaults.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the stored scenario and suite runs. Overrides the configured value.
    #[clap(long, global = true)]
    pub store_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: DrillCommand,
}

#[derive(Debug, Subcommand)]
pub enum DrillCommand {
    /// Run a suite or a single scenario
    Run(RunArgs),
    /// Render a stored suite again
    Report(ReportArgs),
    /// List stored suites and the configured suites
    List,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// The suite to run. Defaults to `quick` when no scenario is given either.
    #[clap(long, conflicts_with = "scenario")]
    pub suite: Option<String>,

    /// Run a single scenario instead of a suite
    #[clap(long)]
    pub scenario: Option<String>,

    /// Simulate every step instead of acting on the environment.
    ///
    /// A dry run makes no network calls and starts no processes. It exercises the scenario
    /// definitions, timing and reporting end to end.
    #[clap(long, default_value = "false")]
    pub dry_run: bool,

    /// Report format
    #[clap(long, value_enum, default_value_t = ReportFormatOpt::Json)]
    pub format: ReportFormatOpt,

    /// Write the report to this file instead of stdout
    #[clap(long, short)]
    pub output: Option<PathBuf>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by
    /// anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// How step timings are summarised on the console after each scenario
    #[clap(long, value_enum, default_value_t = ReporterOpt::InMemory)]
    pub reporter: ReporterOpt,
}

impl RunArgs {
    pub fn target(&self) -> RunTarget {
        match (&self.scenario, &self.suite) {
            (Some(scenario), _) => RunTarget::Scenario(scenario.clone()),
            (None, Some(suite)) => RunTarget::Suite(suite.clone()),
            (None, None) => RunTarget::Suite("quick".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    Suite(String),
    Scenario(String),
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Id of the stored suite. Defaults to the most recent one.
    pub suite_id: Option<String>,

    /// Report format
    #[clap(long, value_enum, default_value_t = ReportFormatOpt::Text)]
    pub format: ReportFormatOpt,

    /// Write the report to this file instead of stdout
    #[clap(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormatOpt {
    Json,
    Html,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReporterOpt {
    InMemory,
    Noop,
}

impl From<ReporterOpt> for ReporterKind {
    fn from(value: ReporterOpt) -> Self {
        match value {
            ReporterOpt::InMemory => ReporterKind::InMemory,
            ReporterOpt::Noop => ReporterKind::Noop,
        }
    }
}
