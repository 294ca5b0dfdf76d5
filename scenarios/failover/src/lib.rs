//! Database failover: take the primary away, promote the replica and point the application at it.
//!
//! The RTO clock covers everything from pausing the primary to the application being healthy on
//! the promoted replica.

use drill_runner::prelude::*;

pub const NAME: &str = "failover";

const PRIMARY_PAUSED: &str = "primaryPaused";
/// Set before the pause is issued. A pause that errors or times out may still have happened.
const PRIMARY_PAUSE_REQUESTED: &str = "primaryPauseRequested";

pub fn definition(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
    ScenarioDefinitionBuilder::new(NAME, config.target(NAME)?)
        .with_buckets(["detection", "promotion", "reconnection", "health-check"])
        .use_setup(setup)
        .add_step(
            Step::new(
                "stop-primary",
                "detection",
                stop_primary,
                simulated(500, "primary paused"),
            )
            .critical(),
        )
        .add_step(Step::new(
            "detect-primary-down",
            "detection",
            detect_primary_down,
            simulated(1500, "primary stopped answering"),
        ))
        .add_step(
            Step::new(
                "promote-replica",
                "promotion",
                promote_replica,
                simulated(1500, "replica promoted"),
            )
            .critical(),
        )
        .add_step(Step::new(
            "await-replica-ready",
            "promotion",
            await_replica_ready,
            simulated(1500, "replica accepting connections"),
        ))
        .add_step(Step::new(
            "repoint-application",
            "reconnection",
            repoint_application,
            simulated(500, "application repointed"),
        ))
        .add_step(Step::new(
            "await-application",
            "reconnection",
            await_application,
            simulated(500, "application healthy"),
        ))
        .add_step(Step::new(
            "verify-services",
            "health-check",
            verify_services,
            simulated(600, "all services healthy"),
        ))
        .add_step(Step::new(
            "verify-replica-writable",
            "health-check",
            verify_replica_writable,
            simulated(400, "replica accepted a write"),
        ))
        .use_cleanup(
            "restore-primary",
            restore_primary,
            simulated(500, "primary resumed"),
        )
        .build()
}

/// Both databases must be up before the primary is taken away.
fn setup(ctx: &mut StepContext<'_>) -> HookResult {
    let infrastructure = ctx.config().infrastructure.clone();
    let probes = ctx.probes();

    let (primary_ready, replica_ready) = ctx.execute(async {
        let primary = probes
            .is_database_ready(&infrastructure.primary.host, infrastructure.primary.port)
            .await;
        let replica = probes
            .is_database_ready(&infrastructure.replica.host, infrastructure.replica.port)
            .await;
        Ok((primary, replica))
    })?;

    if !primary_ready {
        anyhow::bail!("primary database {} is not ready", infrastructure.primary.container);
    }
    if !replica_ready {
        anyhow::bail!("replica database {} is not ready", infrastructure.replica.container);
    }

    Ok(())
}

fn stop_primary(ctx: &mut StepContext<'_>) -> ActionResult {
    let container = ctx.config().infrastructure.primary.container.clone();

    ctx.record_detail(PRIMARY_PAUSE_REQUESTED, true);
    container_action(ctx, "pause", &container)?;
    ctx.record_detail(PRIMARY_PAUSED, true);

    Ok(Completion::done(format!("paused {container}")))
}

fn detect_primary_down(ctx: &mut StepContext<'_>) -> ActionResult {
    let primary = ctx.config().infrastructure.primary.clone();
    let interval = ctx.config().poll_interval();
    let probes = ctx.probes();
    let (host, port) = (primary.host.as_str(), primary.port);

    let polls = ctx.execute(async {
        Ok(wait_until(interval, || async move {
            !probes.is_database_ready(host, port).await
        })
        .await)
    })?;

    Ok(Completion::done(format!(
        "primary stopped answering after {polls} polls"
    )))
}

fn promote_replica(ctx: &mut StepContext<'_>) -> ActionResult {
    let command = ctx.config().commands.promote_replica.clone();

    run_command(ctx, &command, &[])?;

    Ok(Completion::done("replica promoted"))
}

fn await_replica_ready(ctx: &mut StepContext<'_>) -> ActionResult {
    let replica = ctx.config().infrastructure.replica.clone();
    let interval = ctx.config().poll_interval();
    let probes = ctx.probes();
    let (host, port) = (replica.host.as_str(), replica.port);

    let polls = ctx.execute(async {
        Ok(wait_until(interval, || async move { probes.is_database_ready(host, port).await }).await)
    })?;

    Ok(Completion::done(format!(
        "replica accepting connections after {polls} polls"
    )))
}

fn repoint_application(ctx: &mut StepContext<'_>) -> ActionResult {
    let command = ctx.config().commands.repoint_application.clone();

    run_command(ctx, &command, &[])?;
    ctx.settle()?;

    Ok(Completion::done("application repointed to replica"))
}

fn await_application(ctx: &mut StepContext<'_>) -> ActionResult {
    let url = ctx.config().infrastructure.application.health_url()?;
    let interval = ctx.config().poll_interval();
    let timeout = ctx.config().http_timeout();
    let probes = ctx.probes();
    let url_ref = &url;

    let polls = ctx.execute(async {
        Ok(wait_until(interval, || async move {
            matches!(probes.http_status(url_ref, timeout).await, Ok(200))
        })
        .await)
    })?;

    Ok(Completion::done(format!(
        "{url} returned 200 after {polls} polls"
    )))
}

fn verify_services(ctx: &mut StepContext<'_>) -> ActionResult {
    let infrastructure = &ctx.config().infrastructure;
    let services = std::iter::once(infrastructure.application.container.clone())
        .chain(infrastructure.dependencies.iter().cloned())
        .collect::<Vec<_>>();
    let probes = ctx.probes();

    let results = ctx.execute(async { Ok(check_services_healthy(probes, &services).await) })?;
    let unhealthy = unhealthy(&results);
    if !unhealthy.is_empty() {
        anyhow::bail!("unhealthy after failover: {}", unhealthy.join(", "));
    }

    Ok(Completion::done(format!("{} services healthy", results.len())))
}

fn verify_replica_writable(ctx: &mut StepContext<'_>) -> ActionResult {
    let command = ctx.config().commands.verify_writable.clone();

    run_command(ctx, &command, &[])?;

    Ok(Completion::done("promoted replica accepted a write"))
}

fn restore_primary(ctx: &mut StepContext<'_>) -> ActionResult {
    if ctx.detail(PRIMARY_PAUSE_REQUESTED).is_none() {
        return Ok(Completion::skipped("primary was never paused"));
    }

    let container = ctx.config().infrastructure.primary.container.clone();
    log::info!("Resuming primary database container {container}");
    container_action(ctx, "unpause", &container)?;

    Ok(Completion::done(format!("unpaused {container}")))
}
