//! Stop the application container and measure how long it takes to bring it back.

use drill_runner::prelude::*;

pub const NAME: &str = "service-recovery";

const SERVICE_STOPPED: &str = "serviceStopped";
/// Set before the stop is issued. A stop that errors or times out may still have happened.
const SERVICE_STOP_REQUESTED: &str = "serviceStopRequested";

pub fn definition(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
    ScenarioDefinitionBuilder::new(NAME, config.target(NAME)?)
        .with_buckets(["detection", "restart", "health-check"])
        .use_setup(setup)
        .add_step(
            Step::new(
                "stop-service",
                "detection",
                stop_service,
                simulated(500, "service stopped"),
            )
            .critical(),
        )
        .add_step(Step::new(
            "detect-service-down",
            "detection",
            detect_service_down,
            simulated(1000, "service reported down"),
        ))
        .add_step(
            Step::new(
                "restart-service",
                "restart",
                restart_service,
                simulated(1500, "service started"),
            )
            .critical(),
        )
        .add_step(Step::new(
            "await-service-healthy",
            "restart",
            await_service_healthy,
            simulated(1500, "service healthy"),
        ))
        .add_step(Step::new(
            "await-health-endpoint",
            "health-check",
            await_health_endpoint,
            simulated(1000, "health endpoint returned 200"),
        ))
        .add_step(Step::new(
            "verify-dependencies",
            "health-check",
            verify_dependencies,
            simulated(500, "dependencies healthy"),
        ))
        .use_cleanup(
            "ensure-service-running",
            ensure_service_running,
            simulated(0, "service running"),
        )
        .build()
}

/// Only a healthy service can be taken down for a measurement.
fn setup(ctx: &mut StepContext<'_>) -> HookResult {
    let service = ctx.config().infrastructure.application.container.clone();
    let probes = ctx.probes();

    if !ctx.execute(async { Ok(probes.is_service_healthy(&service).await) })? {
        anyhow::bail!("service {service} is not healthy");
    }

    Ok(())
}

fn stop_service(ctx: &mut StepContext<'_>) -> ActionResult {
    let service = ctx.config().infrastructure.application.container.clone();

    ctx.record_detail(SERVICE_STOP_REQUESTED, true);
    container_action(ctx, "stop", &service)?;
    ctx.record_detail(SERVICE_STOPPED, true);

    Ok(Completion::done(format!("stopped {service}")))
}

fn detect_service_down(ctx: &mut StepContext<'_>) -> ActionResult {
    let service = ctx.config().infrastructure.application.container.clone();
    let interval = ctx.config().poll_interval();
    let probes = ctx.probes();
    let name = service.as_str();

    let polls = ctx.execute(async {
        Ok(wait_until(interval, || async move { !probes.is_service_healthy(name).await }).await)
    })?;

    Ok(Completion::done(format!(
        "{service} reported down after {polls} polls"
    )))
}

fn restart_service(ctx: &mut StepContext<'_>) -> ActionResult {
    let service = ctx.config().infrastructure.application.container.clone();

    container_action(ctx, "start", &service)?;

    Ok(Completion::done(format!("started {service}")))
}

fn await_service_healthy(ctx: &mut StepContext<'_>) -> ActionResult {
    let service = ctx.config().infrastructure.application.container.clone();
    let interval = ctx.config().poll_interval();
    let probes = ctx.probes();
    let name = service.as_str();

    let polls = ctx.execute(async {
        Ok(wait_until(interval, || async move { probes.is_service_healthy(name).await }).await)
    })?;

    Ok(Completion::done(format!(
        "{service} healthy after {polls} polls"
    )))
}

fn await_health_endpoint(ctx: &mut StepContext<'_>) -> ActionResult {
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
    ctx.record_detail("healthEndpointPolls", polls);

    Ok(Completion::done(format!(
        "{url} returned 200 after {polls} polls"
    )))
}

fn verify_dependencies(ctx: &mut StepContext<'_>) -> ActionResult {
    let dependencies = ctx.config().infrastructure.dependencies.clone();
    let probes = ctx.probes();

    let results = ctx.execute(async { Ok(check_services_healthy(probes, &dependencies).await) })?;
    let unhealthy = unhealthy(&results);
    if !unhealthy.is_empty() {
        anyhow::bail!("unhealthy dependencies: {}", unhealthy.join(", "));
    }

    Ok(Completion::done(format!(
        "{} dependencies healthy",
        results.len()
    )))
}

/// Leave the service running whatever happened, without touching it if it never went down.
fn ensure_service_running(ctx: &mut StepContext<'_>) -> ActionResult {
    if ctx.detail(SERVICE_STOP_REQUESTED).is_none() {
        return Ok(Completion::skipped("service was never stopped"));
    }

    let service = ctx.config().infrastructure.application.container.clone();
    let probes = ctx.probes();
    if ctx.execute(async { Ok(probes.is_service_healthy(&service).await) })? {
        return Ok(Completion::skipped(format!("{service} is already running")));
    }

    log::warn!("Service {service} is still down after the drill, starting it");
    container_action(ctx, "start", &service)?;

    Ok(Completion::done(format!("started {service}")))
}
