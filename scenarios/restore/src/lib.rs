//! Restore the most recent backup into a scratch database and check that it holds data.
//!
//! Measured against the RPO target. The backup location found by the first step is handed to the
//! later steps through the run details.

use std::path::Path;

use drill_runner::prelude::*;

pub const NAME: &str = "restore";

const BACKUP_LOCATION: &str = "backupLocation";
const RESTORE_TARGET_PREPARED: &str = "restoreTargetPrepared";

pub fn definition(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
    ScenarioDefinitionBuilder::new(NAME, config.target(NAME)?)
        .with_buckets(["selection", "download", "restore", "verification"])
        .add_step(
            Step::new(
                "locate-backup",
                "selection",
                locate_backup,
                simulated(500, "latest backup located"),
            )
            .critical(),
        )
        .add_step(Step::new(
            "download-backup",
            "download",
            download_backup,
            simulated(3000, "backup downloaded"),
        ))
        .add_step(
            Step::new(
                "verify-download",
                "download",
                verify_download,
                simulated(100, "download is not empty"),
            )
            .critical(),
        )
        .add_step(Step::new(
            "prepare-target",
            "restore",
            prepare_target,
            simulated(500, "restore target created"),
        ))
        .add_step(
            Step::new(
                "restore-backup",
                "restore",
                restore_backup,
                simulated(4000, "backup restored"),
            )
            .critical(),
        )
        .add_step(Step::new(
            "verify-row-count",
            "verification",
            verify_row_count,
            simulated(1500, "row count above minimum"),
        ))
        .add_step(Step::new(
            "verify-database-ready",
            "verification",
            verify_database_ready,
            simulated(200, "restored database ready"),
        ))
        .use_cleanup(
            "discard-restore",
            discard_restore,
            simulated(500, "restore target discarded"),
        )
        .build()
}

fn download_path(ctx: &StepContext<'_>) -> String {
    ctx.config().restore.download_path.display().to_string()
}

fn locate_backup(ctx: &mut StepContext<'_>) -> ActionResult {
    let command = ctx.config().commands.locate_backup.clone();

    let output = run_command(ctx, &command, &[])?;
    let Some(location) = output
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
    else {
        anyhow::bail!("`{command}` did not print a backup location");
    };
    ctx.record_detail(BACKUP_LOCATION, location.clone());

    Ok(Completion::done(format!("latest backup is {location}")))
}

fn download_backup(ctx: &mut StepContext<'_>) -> ActionResult {
    let command = ctx.config().commands.download_backup.clone();
    let download_path = download_path(ctx);
    let Some(backup) = ctx.detail_str(BACKUP_LOCATION).map(str::to_string) else {
        anyhow::bail!("no backup location was recorded");
    };

    run_command(
        ctx,
        &command,
        &[("backup", &backup), ("download_path", &download_path)],
    )?;

    Ok(Completion::done(format!("downloaded {backup} to {download_path}")))
}

fn verify_download(ctx: &mut StepContext<'_>) -> ActionResult {
    let path = ctx.config().restore.download_path.clone();
    let probes = ctx.probes();

    let size = ctx.execute(async {
        if !probes.file_exists(&path).await {
            anyhow::bail!("{} does not exist", path.display());
        }
        probes.file_size_bytes(&path).await
    })?;
    ctx.record_detail("backupSizeBytes", size);

    if size == 0 {
        anyhow::bail!("{} is empty", path.display());
    }

    Ok(Completion::done(format!("downloaded {size} bytes")))
}

fn prepare_target(ctx: &mut StepContext<'_>) -> ActionResult {
    let command = ctx.config().commands.prepare_restore_target.clone();

    run_command(ctx, &command, &[])?;
    ctx.record_detail(RESTORE_TARGET_PREPARED, true);

    Ok(Completion::done("restore target created"))
}

fn restore_backup(ctx: &mut StepContext<'_>) -> ActionResult {
    let command = ctx.config().commands.restore_backup.clone();
    let download_path = download_path(ctx);

    run_command(ctx, &command, &[("download_path", &download_path)])?;

    Ok(Completion::done("backup restored"))
}

fn verify_row_count(ctx: &mut StepContext<'_>) -> ActionResult {
    let command = ctx.config().commands.row_count.clone();
    let min_row_count = ctx.config().restore.min_row_count;

    let output = run_command(ctx, &command, &[])?;
    let printed = output.stdout.trim();
    let row_count = printed
        .parse::<u64>()
        .map_err(|e| anyhow::anyhow!("`{command}` printed {printed:?}, not a row count: {e}"))?;
    ctx.record_detail("rowCount", row_count);

    if row_count < min_row_count {
        anyhow::bail!("restored {row_count} rows, expected at least {min_row_count}");
    }

    Ok(Completion::done(format!("restored {row_count} rows")))
}

fn verify_database_ready(ctx: &mut StepContext<'_>) -> ActionResult {
    let replica = ctx.config().infrastructure.replica.clone();
    let probes = ctx.probes();

    let ready =
        ctx.execute(async { Ok(probes.is_database_ready(&replica.host, replica.port).await) })?;
    if !ready {
        anyhow::bail!("restore database at {}:{} is not ready", replica.host, replica.port);
    }

    Ok(Completion::done("restored database ready"))
}

fn discard_restore(ctx: &mut StepContext<'_>) -> ActionResult {
    let prepared = ctx.detail(RESTORE_TARGET_PREPARED).is_some();
    let path = ctx.config().restore.download_path.clone();

    if prepared {
        let command = ctx.config().commands.discard_restore_target.clone();
        run_command(ctx, &command, &[])?;
    }
    let removed = remove_download(&path)?;

    Ok(match (prepared, removed) {
        (false, false) => Completion::skipped("nothing to discard"),
        (true, false) => Completion::done("restore target discarded"),
        (false, true) => Completion::done(format!("removed {}", path.display())),
        (true, true) => Completion::done(format!(
            "restore target discarded, removed {}",
            path.display()
        )),
    })
}

/// Remove the downloaded backup, which may never have been written.
fn remove_download(path: &Path) -> DrillResult<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed downloaded backup {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(anyhow::anyhow!(e).context(format!("Failed to remove {}", path.display()))),
    }
}
