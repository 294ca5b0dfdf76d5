use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use drill_summary_model::ComplianceTarget;
use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable naming the configuration file when `--config` is not given.
pub const CONFIG_ENV: &str = "DRILL_CONFIG";
/// Environment variable overriding [DrillConfig::store_dir].
pub const STORE_DIR_ENV: &str = "DRILL_STORE_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {source}")]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("no compliance target configured for scenario `{0}`")]
    UnknownScenario(String),
}

/// Drill configuration, read once at startup and shared read-only for the whole run.
///
/// Every section has defaults, so an empty file is a valid configuration. Targets and suites given
/// in a file are merged over the defaults by key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DrillConfig {
    pub store_dir: PathBuf,
    pub targets: BTreeMap<String, ComplianceTarget>,
    pub suites: BTreeMap<String, Vec<String>>,
    pub timeouts: Timeouts,
    pub dry_run: DryRunConfig,
    pub infrastructure: Infrastructure,
    pub commands: Commands,
    pub restore: RestoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Deadline for a single step unless the step declares its own.
    pub step_seconds: u64,
    /// Deadline for cleanup, which runs even after cancellation.
    pub cleanup_seconds: u64,
    /// Timeout for a single HTTP request.
    pub http_seconds: u64,
    /// Interval between probes while polling for a condition.
    pub poll_interval_ms: u64,
    /// Pause after a mutating action before observing its effect.
    pub settle_seconds: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step_seconds: 120,
            cleanup_seconds: 60,
            http_seconds: 5,
            poll_interval_ms: 500,
            settle_seconds: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DryRunConfig {
    /// Multiplier applied to the nominal duration of simulated steps. `0` runs a dry run without
    /// sleeping at all.
    pub pacing: f64,
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self { pacing: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Infrastructure {
    /// Container runtime CLI, e.g. `docker` or `podman`.
    pub container_runtime: String,
    pub primary: DatabaseEndpoint,
    pub replica: DatabaseEndpoint,
    pub application: ApplicationEndpoint,
    /// Containers the application depends on, checked after recovery.
    pub dependencies: Vec<String>,
}

impl Default for Infrastructure {
    fn default() -> Self {
        Self {
            container_runtime: "docker".to_string(),
            primary: DatabaseEndpoint {
                container: "db-primary".to_string(),
                host: "localhost".to_string(),
                port: 5432,
            },
            replica: DatabaseEndpoint {
                container: "db-replica".to_string(),
                host: "localhost".to_string(),
                port: 5433,
            },
            application: ApplicationEndpoint::default(),
            dependencies: vec!["cache".to_string(), "queue".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseEndpoint {
    pub container: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationEndpoint {
    pub container: String,
    health_url: String,
}

impl Default for ApplicationEndpoint {
    fn default() -> Self {
        Self {
            container: "app".to_string(),
            health_url: "http://localhost:8080/health".to_string(),
        }
    }
}

impl ApplicationEndpoint {
    pub fn health_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.health_url).map_err(|e| {
            ConfigError::Invalid(format!(
                "application health_url `{}` is not a valid URL: {e}",
                self.health_url
            ))
        })
    }
}

/// A command line as an argument vector, e.g. `["docker", "exec", "db", "pg_ctl", "promote"]`.
///
/// Arguments may contain `{name}` placeholders which are substituted when the command is rendered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CommandLine(Vec<String>);

impl CommandLine {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0
            .first()
            .map_or(true, |program| program.trim().is_empty())
    }

    pub fn program(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// Arguments after the program with placeholders substituted.
    pub fn render_args(&self, substitutions: &[(&str, &str)]) -> Vec<String> {
        self.0
            .iter()
            .skip(1)
            .map(|arg| {
                substitutions
                    .iter()
                    .fold(arg.clone(), |arg, (name, value)| {
                        arg.replace(&format!("{{{name}}}"), value)
                    })
            })
            .collect()
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// Operator supplied commands for the recovery actions the drill measures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Commands {
    pub promote_replica: CommandLine,
    pub repoint_application: CommandLine,
    pub verify_writable: CommandLine,
    /// Must print the location of the most recent backup as the last line of its output.
    pub locate_backup: CommandLine,
    /// Placeholders: `{backup}`, `{download_path}`.
    pub download_backup: CommandLine,
    pub prepare_restore_target: CommandLine,
    /// Placeholders: `{download_path}`.
    pub restore_backup: CommandLine,
    /// Must print a single row count.
    pub row_count: CommandLine,
    pub discard_restore_target: CommandLine,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            promote_replica: CommandLine::new([
                "docker",
                "exec",
                "db-replica",
                "pg_ctl",
                "promote",
                "-D",
                "/var/lib/postgresql/data",
            ]),
            repoint_application: CommandLine::new([
                "docker",
                "exec",
                "app",
                "/usr/local/bin/repoint-database",
                "db-replica",
            ]),
            verify_writable: CommandLine::new([
                "psql",
                "-h",
                "localhost",
                "-p",
                "5433",
                "-U",
                "postgres",
                "-c",
                "CREATE TABLE drill_write_check (id int); DROP TABLE drill_write_check;",
            ]),
            locate_backup: CommandLine::new([
                "sh",
                "-c",
                "aws s3 ls s3://drill-backups/postgres/ | sort | tail -n 1 | awk '{print $4}'",
            ]),
            download_backup: CommandLine::new([
                "aws",
                "s3",
                "cp",
                "s3://drill-backups/postgres/{backup}",
                "{download_path}",
            ]),
            prepare_restore_target: CommandLine::new([
                "createdb",
                "-h",
                "localhost",
                "-p",
                "5433",
                "-U",
                "postgres",
                "drill_restore",
            ]),
            restore_backup: CommandLine::new([
                "pg_restore",
                "-h",
                "localhost",
                "-p",
                "5433",
                "-U",
                "postgres",
                "-d",
                "drill_restore",
                "{download_path}",
            ]),
            row_count: CommandLine::new([
                "psql",
                "-h",
                "localhost",
                "-p",
                "5433",
                "-U",
                "postgres",
                "-d",
                "drill_restore",
                "-tAc",
                "SELECT count(*) FROM orders",
            ]),
            discard_restore_target: CommandLine::new([
                "dropdb",
                "-h",
                "localhost",
                "-p",
                "5433",
                "-U",
                "postgres",
                "--if-exists",
                "drill_restore",
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreConfig {
    pub download_path: PathBuf,
    /// Smallest row count accepted as a successful restore.
    pub min_row_count: u64,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            download_path: PathBuf::from("/tmp/drill-backup.dump"),
            min_row_count: 1,
        }
    }
}

fn default_targets() -> BTreeMap<String, ComplianceTarget> {
    BTreeMap::from([
        ("failover".to_string(), ComplianceTarget::rto(900)),
        ("restore".to_string(), ComplianceTarget::rpo(300)),
        ("service-recovery".to_string(), ComplianceTarget::rto(300)),
        ("health-probe".to_string(), ComplianceTarget::rto(60)),
    ])
}

fn default_suites() -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        ("quick".to_string(), vec!["health-probe".to_string()]),
        (
            "full".to_string(),
            vec![
                "failover".to_string(),
                "restore".to_string(),
                "service-recovery".to_string(),
            ],
        ),
    ])
}

impl DrillConfig {
    /// Load the configuration from `path`, else from the file named by [CONFIG_ENV], else use the
    /// defaults. [STORE_DIR_ENV] overrides the store directory in every case.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                log::debug!("Loading config from {}", path.display());
                let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                toml::from_str::<DrillConfig>(&content).map_err(|source| ConfigError::Parse {
                    path: Some(path),
                    source,
                })?
            }
            None => {
                log::debug!("No config file given, using defaults");
                DrillConfig::default()
            }
        };

        if let Some(store_dir) = std::env::var_os(STORE_DIR_ENV) {
            config.store_dir = PathBuf::from(store_dir);
        }

        config.finish()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str::<DrillConfig>(content)
            .map_err(|source| ConfigError::Parse { path: None, source })?
            .finish()
    }

    /// The default configuration, with defaults filled and validated.
    pub fn defaults() -> Result<Self, ConfigError> {
        DrillConfig::default().finish()
    }

    fn finish(mut self) -> Result<Self, ConfigError> {
        for (name, target) in default_targets() {
            self.targets.entry(name).or_insert(target);
        }
        for (name, scenarios) in default_suites() {
            self.suites.entry(name).or_insert(scenarios);
        }
        if self.store_dir.as_os_str().is_empty() {
            self.store_dir = PathBuf::from("drill-results");
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, target) in &self.targets {
            if target.threshold_seconds == 0 {
                return Err(ConfigError::Invalid(format!(
                    "target for `{name}` must have a positive threshold"
                )));
            }
        }

        for (suite, scenarios) in &self.suites {
            if scenarios.is_empty() {
                return Err(ConfigError::Invalid(format!("suite `{suite}` is empty")));
            }
            if let Some(unknown) = scenarios.iter().find(|s| !self.targets.contains_key(*s)) {
                return Err(ConfigError::Invalid(format!(
                    "suite `{suite}` names `{unknown}` which has no compliance target"
                )));
            }
        }

        if self.timeouts.step_seconds == 0 || self.timeouts.cleanup_seconds == 0 {
            return Err(ConfigError::Invalid(
                "step and cleanup timeouts must be positive".to_string(),
            ));
        }
        if !self.dry_run.pacing.is_finite() || self.dry_run.pacing < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "dry run pacing must be a non-negative number, got {}",
                self.dry_run.pacing
            )));
        }
        if self.infrastructure.container_runtime.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "container_runtime must not be empty".to_string(),
            ));
        }

        let commands = [
            ("promote_replica", &self.commands.promote_replica),
            ("repoint_application", &self.commands.repoint_application),
            ("verify_writable", &self.commands.verify_writable),
            ("locate_backup", &self.commands.locate_backup),
            ("download_backup", &self.commands.download_backup),
            ("prepare_restore_target", &self.commands.prepare_restore_target),
            ("restore_backup", &self.commands.restore_backup),
            ("row_count", &self.commands.row_count),
            ("discard_restore_target", &self.commands.discard_restore_target),
        ];
        if let Some((name, _)) = commands.iter().find(|(_, command)| command.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "command `{name}` must not be empty"
            )));
        }

        self.infrastructure.application.health_url()?;

        Ok(())
    }

    pub fn target(&self, scenario: &str) -> Result<ComplianceTarget, ConfigError> {
        self.targets
            .get(scenario)
            .copied()
            .ok_or_else(|| ConfigError::UnknownScenario(scenario.to_string()))
    }

    pub fn suite(&self, name: &str) -> Option<&[String]> {
        self.suites.get(name).map(Vec::as_slice)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.step_seconds)
    }

    pub fn cleanup_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.cleanup_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.http_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.timeouts.poll_interval_ms.max(1))
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.timeouts.settle_seconds)
    }

    /// Scale a nominal simulated duration by the configured pacing.
    pub fn paced(&self, nominal: Duration) -> Duration {
        nominal.mul_f64(self.dry_run.pacing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drill_summary_model::ComplianceMetric;

    #[test]
    fn empty_file_gives_defaults() {
        let config = DrillConfig::from_toml_str("").unwrap();

        assert_eq!(ComplianceTarget::rto(900), config.target("failover").unwrap());
        assert_eq!(ComplianceTarget::rpo(300), config.target("restore").unwrap());
        assert_eq!(Some(&["health-probe".to_string()][..]), config.suite("quick"));
        assert_eq!(3, config.suite("full").unwrap().len());
        assert_eq!(PathBuf::from("drill-results"), config.store_dir);
        assert_eq!(Duration::from_secs(120), config.step_timeout());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let config = DrillConfig::from_toml_str(
            r#"
store_dir = "/var/lib/drill"

[targets.failover]
metric = "rto"
threshold_seconds = 600

[suites]
nightly = ["failover", "restore"]

[timeouts]
step_seconds = 30

[dry_run]
pacing = 0.0

[infrastructure.application]
container = "api"
health_url = "http://api.internal:9000/ready"
"#,
        )
        .unwrap();

        assert_eq!(600, config.target("failover").unwrap().threshold_seconds);
        assert_eq!(ComplianceMetric::Rpo, config.target("restore").unwrap().metric);
        assert_eq!(2, config.suite("nightly").unwrap().len());
        assert!(config.suite("quick").is_some());
        assert_eq!(Duration::from_secs(30), config.step_timeout());
        assert_eq!(Duration::ZERO, config.paced(Duration::from_secs(2)));
        assert_eq!(
            "api.internal",
            config
                .infrastructure
                .application
                .health_url()
                .unwrap()
                .host_str()
                .unwrap()
        );
        assert_eq!(5432, config.infrastructure.primary.port);
    }

    #[test]
    fn suite_with_unknown_scenario_is_rejected() {
        let err = DrillConfig::from_toml_str(
            r#"
[suites]
broken = ["failover", "chaos-monkey"]
"#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("chaos-monkey"), "{err}");
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let err = DrillConfig::from_toml_str(
            r#"
[targets.restore]
metric = "RPO"
threshold_seconds = 0
"#,
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = DrillConfig::from_toml_str(
            r#"
[commands]
promote_replica = []
"#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("promote_replica"), "{err}");
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        assert!(matches!(
            DrillConfig::from_toml_str("store_dir = ["),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn command_placeholders_are_substituted() {
        let command = CommandLine::new(["aws", "s3", "cp", "s3://b/{backup}", "{download_path}"]);

        assert_eq!("aws", command.program());
        assert_eq!(
            vec!["s3", "cp", "s3://b/2026-01-01.dump", "/tmp/x.dump"],
            command.render_args(&[("backup", "2026-01-01.dump"), ("download_path", "/tmp/x.dump")])
        );
    }
}
