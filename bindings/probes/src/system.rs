use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use drill_core::prelude::TimeoutError;
use futures::FutureExt;
use url::Url;

use crate::probes::{ProbeFuture, Probes, ProcessOutput};

const INSPECT_TIMEOUT: Duration = Duration::from_secs(10);
const DATABASE_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Probes backed by the real environment: the container runtime CLI, `pg_isready`, HTTP and the
/// local filesystem.
#[derive(Debug, Clone)]
pub struct SystemProbes {
    container_runtime: String,
    pg_isready: Option<PathBuf>,
    client: reqwest::Client,
}

impl SystemProbes {
    pub fn new(container_runtime: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        let pg_isready = which::which("pg_isready").ok();
        if pg_isready.is_none() {
            log::info!("pg_isready not found on PATH, database probes will use a TCP connect");
        }

        Ok(Self {
            container_runtime: container_runtime.into(),
            pg_isready,
            client,
        })
    }

    async fn inspect_state(&self, service: &str) -> anyhow::Result<String> {
        let args = [
            "inspect".to_string(),
            "--format".to_string(),
            "{{if .State.Health}}{{.State.Health.Status}}{{else}}{{.State.Status}}{{end}}"
                .to_string(),
            service.to_string(),
        ];
        let output = run(&self.container_runtime, &args, INSPECT_TIMEOUT).await?;
        if !output.success() {
            anyhow::bail!(
                "{} inspect {service} failed with {}",
                self.container_runtime,
                output.describe_failure()
            );
        }

        Ok(output.stdout.trim().to_string())
    }
}

impl Probes for SystemProbes {
    fn is_service_healthy<'a>(&'a self, service: &'a str) -> ProbeFuture<'a, bool> {
        async move {
            match self.inspect_state(service).await {
                Ok(state) => {
                    log::debug!("Service {service} reports state {state}");
                    matches!(state.as_str(), "healthy" | "running")
                }
                Err(e) => {
                    log::debug!("Could not inspect service {service}: {e:?}");
                    false
                }
            }
        }
        .boxed()
    }

    fn is_database_ready<'a>(&'a self, host: &'a str, port: u16) -> ProbeFuture<'a, bool> {
        async move {
            match &self.pg_isready {
                Some(pg_isready) => {
                    let args = [
                        "-h".to_string(),
                        host.to_string(),
                        "-p".to_string(),
                        port.to_string(),
                        "-t".to_string(),
                        DATABASE_PROBE_TIMEOUT.as_secs().to_string(),
                    ];
                    match run(
                        &pg_isready.to_string_lossy(),
                        &args,
                        DATABASE_PROBE_TIMEOUT + Duration::from_secs(1),
                    )
                    .await
                    {
                        Ok(output) => output.success(),
                        Err(e) => {
                            log::debug!("pg_isready against {host}:{port} failed: {e:?}");
                            false
                        }
                    }
                }
                None => tcp_ready(host, port, DATABASE_PROBE_TIMEOUT).await,
            }
        }
        .boxed()
    }

    fn http_status<'a>(
        &'a self,
        url: &'a Url,
        timeout: Duration,
    ) -> ProbeFuture<'a, anyhow::Result<u16>> {
        async move {
            let response = self
                .client
                .get(url.clone())
                .timeout(timeout)
                .send()
                .await
                .with_context(|| format!("GET {url} failed"))?;

            Ok(response.status().as_u16())
        }
        .boxed()
    }

    fn run_process<'a>(
        &'a self,
        command: &'a str,
        args: &'a [String],
        timeout: Duration,
    ) -> ProbeFuture<'a, anyhow::Result<ProcessOutput>> {
        run(command, args, timeout).boxed()
    }

    fn file_exists<'a>(&'a self, path: &'a Path) -> ProbeFuture<'a, bool> {
        async move { tokio::fs::try_exists(path).await.unwrap_or(false) }.boxed()
    }

    fn file_size_bytes<'a>(&'a self, path: &'a Path) -> ProbeFuture<'a, anyhow::Result<u64>> {
        async move {
            let metadata = tokio::fs::metadata(path)
                .await
                .with_context(|| format!("Could not read metadata for {}", path.display()))?;

            Ok(metadata.len())
        }
        .boxed()
    }
}

async fn run(command: &str, args: &[String], timeout: Duration) -> anyhow::Result<ProcessOutput> {
    log::debug!("Running {command} {}", args.join(" "));

    let child = tokio::process::Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("Failed to start {command}"))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.with_context(|| format!("Failed to wait for {command}"))?,
        Err(_) => {
            return Err(anyhow::anyhow!(TimeoutError::new(format!(
                "{command} did not finish within {}ms",
                timeout.as_millis()
            ))));
        }
    };

    Ok(ProcessOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

async fn tcp_ready(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            log::debug!("TCP connect to {host}:{port} failed: {e}");
            false
        }
        Err(_) => {
            log::debug!("TCP connect to {host}:{port} timed out");
            false
        }
    }
}
