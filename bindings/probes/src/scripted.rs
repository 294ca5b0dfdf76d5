use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use url::Url;

use crate::probes::{ProbeFuture, Probes, ProcessOutput};

/// A call received by [ScriptedProbes].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeCall {
    ServiceHealthy(String),
    DatabaseReady { host: String, port: u16 },
    HttpStatus(String),
    RunProcess { command: String, args: Vec<String> },
    FileExists(PathBuf),
    FileSize(PathBuf),
}

#[derive(Debug, Clone)]
enum ProcessScript {
    Output(ProcessOutput),
    Error(String),
    Panic(String),
}

/// Answers queued for one probe. The front answer is consumed on each call until a single answer
/// remains, which is then repeated.
#[derive(Debug, Clone)]
struct Answers<T>(VecDeque<T>);

impl<T: Clone> Answers<T> {
    fn next(&mut self) -> Option<T> {
        if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.0.front().cloned()
        }
    }
}

impl<T> FromIterator<T> for Answers<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Default)]
struct Script {
    service_health: HashMap<String, Answers<bool>>,
    database_ready: HashMap<u16, Answers<bool>>,
    http_status: Option<Answers<Option<u16>>>,
    processes: HashMap<String, Answers<ProcessScript>>,
    process_delay: HashMap<String, Duration>,
    files: HashMap<PathBuf, u64>,
}

/// Probes that answer from a script and record every call.
///
/// Unscripted probes answer optimistically: services are healthy, databases are ready, HTTP
/// returns 200, processes exit with code 0 and empty output, files exist with a size of 1024 bytes.
/// Processes are matched on their command name.
#[derive(Debug, Default)]
pub struct ScriptedProbes {
    script: Mutex<Script>,
    calls: Mutex<Vec<ProbeCall>>,
}

impl ScriptedProbes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_health(
        self,
        service: &str,
        answers: impl IntoIterator<Item = bool>,
    ) -> Self {
        self.script
            .lock()
            .service_health
            .insert(service.to_string(), answers.into_iter().collect());
        self
    }

    pub fn with_database_ready(self, port: u16, answers: impl IntoIterator<Item = bool>) -> Self {
        self.script
            .lock()
            .database_ready
            .insert(port, answers.into_iter().collect());
        self
    }

    /// Scripted HTTP answers, `None` meaning no response.
    pub fn with_http_status(self, answers: impl IntoIterator<Item = Option<u16>>) -> Self {
        self.script.lock().http_status = Some(answers.into_iter().collect());
        self
    }

    pub fn with_process_output(self, command: &str, exit_code: i32, stdout: &str) -> Self {
        self.push_process(
            command,
            ProcessScript::Output(ProcessOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: if exit_code == 0 {
                    String::new()
                } else {
                    format!("{command} failed")
                },
            }),
        )
    }

    /// The process cannot be started.
    pub fn with_process_error(self, command: &str, message: &str) -> Self {
        self.push_process(command, ProcessScript::Error(message.to_string()))
    }

    /// Running the process panics, for exercising panic containment.
    pub fn with_process_panic(self, command: &str, message: &str) -> Self {
        self.push_process(command, ProcessScript::Panic(message.to_string()))
    }

    /// The process takes `delay` before answering, bounded by the caller's timeout.
    pub fn with_process_delay(self, command: &str, delay: Duration) -> Self {
        self.script
            .lock()
            .process_delay
            .insert(command.to_string(), delay);
        self
    }

    pub fn with_file(self, path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        self.script.lock().files.insert(path.into(), size_bytes);
        self
    }

    fn push_process(self, command: &str, answer: ProcessScript) -> Self {
        self.script
            .lock()
            .processes
            .entry(command.to_string())
            .or_insert_with(|| Answers(VecDeque::new()))
            .0
            .push_back(answer);
        self
    }

    pub fn calls(&self) -> Vec<ProbeCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Commands run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ProbeCall::RunProcess { command, .. } => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ProbeCall) {
        self.calls.lock().push(call);
    }
}

impl Probes for ScriptedProbes {
    fn is_service_healthy<'a>(&'a self, service: &'a str) -> ProbeFuture<'a, bool> {
        self.record(ProbeCall::ServiceHealthy(service.to_string()));
        let answer = self
            .script
            .lock()
            .service_health
            .get_mut(service)
            .and_then(Answers::next)
            .unwrap_or(true);

        futures::future::ready(answer).boxed()
    }

    fn is_database_ready<'a>(&'a self, host: &'a str, port: u16) -> ProbeFuture<'a, bool> {
        self.record(ProbeCall::DatabaseReady {
            host: host.to_string(),
            port,
        });
        let answer = self
            .script
            .lock()
            .database_ready
            .get_mut(&port)
            .and_then(Answers::next)
            .unwrap_or(true);

        futures::future::ready(answer).boxed()
    }

    fn http_status<'a>(
        &'a self,
        url: &'a Url,
        _timeout: Duration,
    ) -> ProbeFuture<'a, anyhow::Result<u16>> {
        self.record(ProbeCall::HttpStatus(url.to_string()));
        let answer = match self.script.lock().http_status.as_mut() {
            Some(answers) => answers.next().flatten(),
            None => Some(200),
        };

        let result = answer.ok_or_else(|| anyhow::anyhow!("No response from {url}"));
        futures::future::ready(result).boxed()
    }

    fn run_process<'a>(
        &'a self,
        command: &'a str,
        args: &'a [String],
        timeout: Duration,
    ) -> ProbeFuture<'a, anyhow::Result<ProcessOutput>> {
        self.record(ProbeCall::RunProcess {
            command: command.to_string(),
            args: args.to_vec(),
        });
        let (answer, delay) = {
            let mut script = self.script.lock();
            let answer = script.processes.get_mut(command).and_then(Answers::next);
            (answer, script.process_delay.get(command).copied())
        };

        async move {
            if let Some(delay) = delay {
                if delay > timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(anyhow::anyhow!(drill_core::prelude::TimeoutError::new(
                        format!("{command} did not finish within {}ms", timeout.as_millis())
                    )));
                }
                tokio::time::sleep(delay).await;
            }

            match answer {
                None => Ok(ProcessOutput::default()),
                Some(ProcessScript::Output(output)) => Ok(output),
                Some(ProcessScript::Error(message)) => Err(anyhow::anyhow!(message)),
                Some(ProcessScript::Panic(message)) => panic!("{message}"),
            }
        }
        .boxed()
    }

    fn file_exists<'a>(&'a self, path: &'a Path) -> ProbeFuture<'a, bool> {
        self.record(ProbeCall::FileExists(path.to_path_buf()));
        let script = self.script.lock();
        let answer = script.files.is_empty() || script.files.contains_key(path);

        futures::future::ready(answer).boxed()
    }

    fn file_size_bytes<'a>(&'a self, path: &'a Path) -> ProbeFuture<'a, anyhow::Result<u64>> {
        self.record(ProbeCall::FileSize(path.to_path_buf()));
        let script = self.script.lock();
        let answer = if script.files.is_empty() {
            Ok(1024)
        } else {
            script
                .files
                .get(path)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("{} does not exist", path.display()))
        };

        futures::future::ready(answer).boxed()
    }
}
