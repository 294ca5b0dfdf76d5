use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use url::Url;

pub type ProbeFuture<'a, T> = BoxFuture<'a, T>;

/// Output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code, `-1` if the process was terminated by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Human readable summary for error messages, preferring stderr.
    pub fn describe_failure(&self) -> String {
        let stream = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };

        if stream.is_empty() {
            format!("exit code {}", self.exit_code)
        } else {
            format!("exit code {}: {}", self.exit_code, stream)
        }
    }
}

/// Everything a scenario needs to observe or act on the deployment under test.
///
/// Yes/no probes never fail. A probe that cannot get an answer, because the service is down or the
/// tooling is missing, reports `false` and logs the reason at debug level.
pub trait Probes: Debug + Send + Sync {
    /// Whether the container runtime reports the named service as healthy or running.
    fn is_service_healthy<'a>(&'a self, service: &'a str) -> ProbeFuture<'a, bool>;

    /// Whether the database at `host:port` accepts connections.
    fn is_database_ready<'a>(&'a self, host: &'a str, port: u16) -> ProbeFuture<'a, bool>;

    /// The HTTP status returned for a GET of `url`. Fails if no response arrives.
    fn http_status<'a>(
        &'a self,
        url: &'a Url,
        timeout: Duration,
    ) -> ProbeFuture<'a, anyhow::Result<u16>>;

    /// Run a process to completion. Fails if it cannot be started or runs past `timeout`, a
    /// non-zero exit is reported through [ProcessOutput::exit_code].
    fn run_process<'a>(
        &'a self,
        command: &'a str,
        args: &'a [String],
        timeout: Duration,
    ) -> ProbeFuture<'a, anyhow::Result<ProcessOutput>>;

    fn file_exists<'a>(&'a self, path: &'a Path) -> ProbeFuture<'a, bool>;

    fn file_size_bytes<'a>(&'a self, path: &'a Path) -> ProbeFuture<'a, anyhow::Result<u64>>;
}
