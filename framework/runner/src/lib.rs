mod cli;
mod common;
mod config;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod progress;
mod run;
mod shutdown;
mod step;
mod suite;
mod types;

pub mod prelude {
    pub use crate::cli::{
        DrillCli, DrillCommand, ReportArgs, ReportFormatOpt, ReporterOpt, RunArgs, RunTarget,
    };
    pub use crate::common::{
        check_services_healthy, container_action, run_command, unhealthy, wait_until,
    };
    pub use crate::config::{
        ApplicationEndpoint, CommandLine, Commands, ConfigError, DatabaseEndpoint, DrillConfig,
        DryRunConfig, Infrastructure, RestoreConfig, Timeouts, CONFIG_ENV, STORE_DIR_ENV,
    };
    pub use crate::context::{RunnerContext, StepContext};
    pub use crate::definition::{
        HookResult, ScenarioDefinition, ScenarioDefinitionBuilder, SetupHook, CLEANUP_BUCKET,
    };
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::step::{simulated, ActionResult, Completion, Simulation, Step, StepAction};
    pub use crate::suite::{
        Orchestrator, ReporterKind, RunOptions, ScenarioFactory, ScenarioRegistry,
    };
    pub use crate::types::DrillResult;
}
