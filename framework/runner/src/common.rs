use std::future::Future;
use std::time::Duration;

use drill_probes::prelude::{Probes, ProcessOutput};
use futures::future::join_all;

use crate::config::CommandLine;
use crate::context::StepContext;
use crate::types::DrillResult;

/// Poll `condition` every `interval` until it holds, returning the number of attempts.
///
/// There is no deadline here. Run it through [StepContext::execute] so that it is bounded by the
/// step deadline, which makes the polling part of the step's measurement.
pub async fn wait_until<F, Fut>(interval: Duration, mut condition: F) -> u32
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let mut attempts = 1;
    while !condition().await {
        tokio::time::sleep(interval).await;
        attempts += 1;
    }

    attempts
}

/// Run a configured command and require it to succeed.
pub fn run_command(
    ctx: &StepContext<'_>,
    command: &CommandLine,
    substitutions: &[(&str, &str)],
) -> DrillResult<ProcessOutput> {
    let args = command.render_args(substitutions);
    let timeout = ctx.remaining();
    let probes = ctx.probes();

    let output =
        ctx.execute(async { probes.run_process(command.program(), &args, timeout).await })?;
    if !output.success() {
        anyhow::bail!("`{command}` failed with {}", output.describe_failure());
    }

    Ok(output)
}

/// Run `<container runtime> <action> <container>`, e.g. `docker pause db-primary`.
pub fn container_action(ctx: &StepContext<'_>, action: &str, container: &str) -> DrillResult<()> {
    let runtime = ctx.config().infrastructure.container_runtime.clone();
    run_command(
        ctx,
        &CommandLine::new([runtime.as_str(), action, container]),
        &[],
    )?;

    Ok(())
}

/// Check several services at once. Health checks are read-only so they run concurrently.
pub async fn check_services_healthy(
    probes: &dyn Probes,
    services: &[String],
) -> Vec<(String, bool)> {
    let checks = services
        .iter()
        .map(|service| async move { (service.clone(), probes.is_service_healthy(service).await) });

    join_all(checks).await
}

/// Names of the services in `results` that are not healthy.
pub fn unhealthy(results: &[(String, bool)]) -> Vec<&str> {
    results
        .iter()
        .filter(|(_, healthy)| !healthy)
        .map(|(service, _)| service.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_probes::prelude::ScriptedProbes;

    #[tokio::test]
    async fn wait_until_counts_attempts() {
        let probes = ScriptedProbes::new().with_service_health("db", [false, false, true]);

        let attempts =
            wait_until(Duration::from_millis(1), || probes.is_service_healthy("db")).await;

        assert_eq!(3, attempts);
    }

    #[tokio::test]
    async fn checks_all_services() {
        let probes = ScriptedProbes::new()
            .with_service_health("cache", [true])
            .with_service_health("queue", [false]);
        let services = vec!["cache".to_string(), "queue".to_string(), "app".to_string()];

        let results = check_services_healthy(&probes, &services).await;

        assert_eq!(3, results.len());
        assert_eq!(vec!["queue"], unhealthy(&results));
    }
}
