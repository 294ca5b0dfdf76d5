use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use drill::{exit_code, OPERATIONAL_ERROR};
use drill_probes::prelude::SystemProbes;
use drill_runner::prelude::*;

fn main() -> ExitCode {
    let cli = init();

    match execute(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("Drill failed: {e:?}");
            eprintln!("Error: {e:#}");
            ExitCode::from(OPERATIONAL_ERROR)
        }
    }
}

fn execute(cli: DrillCli) -> DrillResult<u8> {
    let mut config = DrillConfig::load(cli.config.as_deref())?;
    if let Some(store_dir) = cli.store_dir {
        config.store_dir = store_dir;
    }

    match cli.command {
        DrillCommand::Run(args) => {
            let probes = SystemProbes::new(&config.infrastructure.container_runtime)
                .context("Failed to set up system probes")?;
            let suite_run = drill::run(&args, Arc::new(config), Arc::new(probes))?;

            log::info!(
                "Suite {} finished: {}",
                suite_run.id(),
                suite_run.compliance_verdict()
            );
            Ok(exit_code(suite_run.compliance_verdict()))
        }
        DrillCommand::Report(args) => {
            let suite_run = drill::report(&args, &config)?;
            Ok(exit_code(suite_run.compliance_verdict()))
        }
        DrillCommand::List => {
            print!("{}", drill::list(&config)?);
            Ok(0)
        }
    }
}
