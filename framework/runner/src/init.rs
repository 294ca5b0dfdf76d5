use crate::cli::DrillCli;
use clap::Parser;

/// Initialise the CLI and logging for a drill binary.
pub fn init() -> DrillCli {
    env_logger::init();

    DrillCli::parse()
}
