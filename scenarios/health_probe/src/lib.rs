//! Read-only check that the deployment is healthy, the scenario behind the `quick` suite.

use drill_runner::prelude::*;

pub const NAME: &str = "health-probe";

pub fn definition(config: &DrillConfig) -> DrillResult<ScenarioDefinition> {
    ScenarioDefinitionBuilder::new(NAME, config.target(NAME)?)
        .with_buckets(["health-check"])
        .add_step(Step::new(
            "probe-database",
            "health-check",
            probe_database,
            simulated(100, "primary database ready"),
        ))
        .add_step(Step::new(
            "probe-services",
            "health-check",
            probe_services,
            simulated(200, "all services healthy"),
        ))
        .add_step(Step::new(
            "probe-health-endpoint",
            "health-check",
            probe_health_endpoint,
            simulated(150, "health endpoint returned 200"),
        ))
        .use_cleanup(
            "release-probes",
            release_probes,
            simulated(0, "nothing to release"),
        )
        .build()
}

fn probe_database(ctx: &mut StepContext<'_>) -> ActionResult {
    let primary = ctx.config().infrastructure.primary.clone();
    let probes = ctx.probes();

    let ready =
        ctx.execute(async { Ok(probes.is_database_ready(&primary.host, primary.port).await) })?;
    if !ready {
        anyhow::bail!("primary database at {}:{} is not ready", primary.host, primary.port);
    }

    Ok(Completion::done("primary database ready"))
}

fn probe_services(ctx: &mut StepContext<'_>) -> ActionResult {
    let infrastructure = &ctx.config().infrastructure;
    let services = std::iter::once(infrastructure.application.container.clone())
        .chain(infrastructure.dependencies.iter().cloned())
        .collect::<Vec<_>>();
    let probes = ctx.probes();

    let results = ctx.execute(async { Ok(check_services_healthy(probes, &services).await) })?;
    let unhealthy = unhealthy(&results)
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    ctx.record_detail("unhealthyServices", unhealthy.clone());

    if !unhealthy.is_empty() {
        log::warn!("Unhealthy services: {unhealthy:?}");
        anyhow::bail!("unhealthy services: {}", unhealthy.join(", "));
    }

    Ok(Completion::done(format!("{} services healthy", results.len())))
}

fn probe_health_endpoint(ctx: &mut StepContext<'_>) -> ActionResult {
    let url = ctx.config().infrastructure.application.health_url()?;
    let timeout = ctx.config().http_timeout();
    let probes = ctx.probes();

    let status = ctx.execute(async { probes.http_status(&url, timeout).await })?;
    ctx.record_detail("healthStatus", status);

    if !(200..300).contains(&status) {
        anyhow::bail!("{url} returned {status}");
    }

    Ok(Completion::done(format!("health endpoint returned {status}")))
}

fn release_probes(_: &mut StepContext<'_>) -> ActionResult {
    Ok(Completion::skipped("nothing to release"))
}
