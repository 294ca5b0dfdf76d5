use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::Serialize;
use walkdir::WalkDir;

use crate::scenario_run::{ScenarioRun, REQUIRED_FIELDS};
use crate::suite_run::{ScenarioRunRef, SuiteRecord, SuiteRun};

const SCENARIOS_DIR: &str = "scenarios";
const SUITES_DIR: &str = "suites";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize record for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("record {path} is missing required field `{field}`")]
    MissingField { path: PathBuf, field: &'static str },
    #[error("record {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("no record with id `{0}`")]
    NotFound(String),
    #[error("record {0} is already sealed")]
    AlreadySealed(PathBuf),
    #[error("`{0}` is not a valid record id")]
    InvalidId(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Stores scenario and suite runs as JSON documents under a root directory.
///
/// Layout:
/// - `scenarios/<scenario name>-<start timestamp>.json`, one sealed scenario run per file
/// - `suites/<suite id>.json`, a [SuiteRecord] referencing its scenario runs
///
/// Every write goes to a temporary file in the target directory which is synced and then renamed
/// over the target, so a crash mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct MetricsStore {
    root: PathBuf,
}

impl MetricsStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for dir in [SCENARIOS_DIR, SUITES_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).map_err(io_error(&path))?;
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scenario_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        check_id(id)?;
        Ok(self.root.join(SCENARIOS_DIR).join(format!("{id}.json")))
    }

    pub fn suite_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        check_id(id)?;
        Ok(self.root.join(SUITES_DIR).join(format!("{id}.json")))
    }

    /// Persist a sealed scenario run. A run that has already been stored is never overwritten.
    pub fn seal(&self, scenario_run: &ScenarioRun) -> Result<PathBuf, StoreError> {
        let path = self.scenario_path(scenario_run.id())?;
        write_atomic(&path, scenario_run, false)?;
        log::debug!("Sealed scenario run {}", path.display());

        Ok(path)
    }

    pub fn load(&self, id: &str) -> Result<ScenarioRun, StoreError> {
        let path = self.scenario_path(id)?;
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let value = read_document(&path)?;
        parse_scenario_run(&path, value)
    }

    /// Write the initial record for a suite that is about to start.
    pub fn open_suite(&self, suite: &SuiteRecord) -> Result<(), StoreError> {
        let path = self.suite_path(&suite.id)?;
        write_atomic(&path, suite, false)
    }

    /// Add a reference to a sealed scenario run to a suite record and persist the record.
    pub fn append(
        &self,
        suite: &mut SuiteRecord,
        scenario_run: &ScenarioRun,
    ) -> Result<(), StoreError> {
        let scenario_path = self.scenario_path(scenario_run.id())?;
        if !scenario_path.exists() {
            return Err(StoreError::NotFound(scenario_run.id().to_string()));
        }

        suite.scenarios.push(ScenarioRunRef {
            id: scenario_run.id().to_string(),
            scenario_name: scenario_run.scenario_name().to_string(),
            compliance_verdict: scenario_run.compliance_verdict(),
            path: format!("{SCENARIOS_DIR}/{}.json", scenario_run.id()),
        });

        // Keep the in-memory record in step with what is on disk.
        let written = self
            .suite_path(&suite.id)
            .and_then(|path| write_atomic(&path, suite, true));
        if written.is_err() {
            suite.scenarios.pop();
        }

        written
    }

    /// Record the outcome of a finished suite.
    pub fn close_suite(
        &self,
        suite: &mut SuiteRecord,
        suite_run: &SuiteRun,
    ) -> Result<(), StoreError> {
        suite.ended_at = Some(suite_run.ended_at());
        suite.cancelled = suite_run.cancelled();
        suite.compliance_verdict = suite_run.compliance_verdict();
        suite.errors = suite_run.errors().to_vec();

        write_atomic(&self.suite_path(&suite.id)?, suite, true)
    }

    pub fn load_suite_record(&self, id: &str) -> Result<SuiteRecord, StoreError> {
        let path = self.suite_path(id)?;
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }

        let value = read_document(&path)?;
        serde_json::from_value(value).map_err(|e| StoreError::Malformed {
            path,
            reason: e.to_string(),
        })
    }

    /// Load a suite together with every scenario run it references.
    pub fn load_suite(&self, id: &str) -> Result<SuiteRun, StoreError> {
        let record = self.load_suite_record(id)?;

        let scenario_runs = record
            .scenarios
            .iter()
            .map(|r| self.load(&r.id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SuiteRun::assemble(
            record.id,
            record.suite_name,
            record.dry_run,
            record.started_at,
            record.ended_at.unwrap_or(record.started_at),
            record.cancelled,
            scenario_runs,
            record.errors,
        ))
    }

    /// All stored suite records, oldest first.
    pub fn list_suites(&self) -> Result<Vec<SuiteRecord>, StoreError> {
        let dir = self.root.join(SUITES_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| StoreError::Io {
                path: dir.clone(),
                source: e.into(),
            })?;

            let is_record = entry.file_type().is_file()
                && entry.path().extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_record {
                continue;
            }

            let value = read_document(entry.path())?;
            let record: SuiteRecord =
                serde_json::from_value(value).map_err(|e| StoreError::Malformed {
                    path: entry.path().to_path_buf(),
                    reason: e.to_string(),
                })?;
            records.push(record);
        }

        Ok(records
            .into_iter()
            .sorted_by_key(|r| (r.started_at, r.id.clone()))
            .collect())
    }
}

fn check_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

fn read_document(path: &Path) -> Result<serde_json::Value, StoreError> {
    let content = fs::read(path).map_err(io_error(path))?;
    serde_json::from_slice(&content).map_err(|e| StoreError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn parse_scenario_run(path: &Path, value: serde_json::Value) -> Result<ScenarioRun, StoreError> {
    let Some(object) = value.as_object() else {
        return Err(StoreError::Malformed {
            path: path.to_path_buf(),
            reason: "expected a JSON object".to_string(),
        });
    };

    if let Some(field) = REQUIRED_FIELDS
        .into_iter()
        .find(|field| !object.contains_key(*field))
    {
        return Err(StoreError::MissingField {
            path: path.to_path_buf(),
            field,
        });
    }

    serde_json::from_value(value).map_err(|e| StoreError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_atomic<T: Serialize>(path: &Path, value: &T, overwrite: bool) -> Result<(), StoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::InvalidId(path.display().to_string()))?;
    fs::create_dir_all(parent).map_err(io_error(parent))?;

    let mut file = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(io_error(parent))?;

    serde_json::to_writer_pretty(&mut file, value).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    file.as_file().sync_all().map_err(io_error(path))?;

    let persisted = if overwrite {
        file.persist(path)
    } else {
        file.persist_noclobber(path)
    };
    persisted.map_err(|e| {
        if e.error.kind() == ErrorKind::AlreadyExists {
            StoreError::AlreadySealed(path.to_path_buf())
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                source: e.error,
            }
        }
    })?;

    if let Err(e) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        log::debug!("Could not sync directory {}: {e}", parent.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::{ComplianceTarget, Verdict};
    use crate::outcome::{Outcome, StepResult};
    use crate::scenario_run::{ScenarioRunRecorder, Termination};

    const T0: i64 = 1_767_225_600_000;

    fn sealed(name: &str, started_at: i64) -> ScenarioRun {
        let mut recorder = ScenarioRunRecorder::new(
            name,
            true,
            ComplianceTarget::rto(60),
            vec!["health-check".to_string(), "cleanup".to_string()],
            started_at,
        );
        recorder.record_step(StepResult::new(
            "probe-database",
            "health-check",
            false,
            started_at,
            started_at + 3,
            Outcome::success("ready", 3, true),
        ));
        recorder.seal(started_at + 5, Termination::Completed)
    }

    fn store() -> (tempfile::TempDir, MetricsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetricsStore::open(dir.path().join("results")).unwrap();
        (dir, store)
    }

    #[test]
    fn seal_then_load() {
        let (_dir, store) = store();
        let run = sealed("health-probe", T0);

        let path = store.seal(&run).unwrap();
        assert!(path.ends_with("scenarios/health-probe-20260101T000000000Z.json"));

        let loaded = store.load(run.id()).unwrap();
        pretty_assertions::assert_eq!(run.step_results(), loaded.step_results());
        assert_eq!(run.total_duration_ms(), loaded.total_duration_ms());
    }

    #[test]
    fn sealed_runs_are_never_overwritten() {
        let (_dir, store) = store();
        let run = sealed("health-probe", T0);
        store.seal(&run).unwrap();

        let err = store.seal(&run).unwrap_err();

        assert!(matches!(err, StoreError::AlreadySealed(_)), "{err:?}");
        assert!(store.load(run.id()).is_ok());
    }

    #[test]
    fn missing_required_field_is_a_typed_error() {
        let (_dir, store) = store();
        let path = store.scenario_path("restore-broken").unwrap();
        fs::write(
            &path,
            r#"{"scenarioName": "restore", "complianceVerdict": "compliant"}"#,
        )
        .unwrap();

        let err = store.load("restore-broken").unwrap_err();

        match err {
            StoreError::MissingField { field, .. } => assert_eq!("totalDurationMs", field),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_id_is_not_found() {
        let (_dir, store) = store();

        assert!(matches!(
            store.load("failover-20990101T000000000Z"),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.load("../etc/passwd"),
            Err(StoreError::InvalidId(_))
        ));
    }

    #[test]
    fn failed_append_leaves_the_record_unchanged() {
        let (_dir, store) = store();
        let mut record = SuiteRecord::new("quick-20260101T000000000Z-abc", "quick", true, T0);
        let run = sealed("health-probe", T0);
        store.seal(&run).unwrap();
        // A directory where the suite record should go makes the write fail.
        fs::create_dir_all(store.suite_path(&record.id).unwrap()).unwrap();

        let err = store.append(&mut record, &run).unwrap_err();

        assert!(matches!(err, StoreError::Io { .. }), "{err:?}");
        assert!(record.scenarios.is_empty());
    }

    #[test]
    fn suite_record_references_scenario_runs() {
        let (_dir, store) = store();
        let mut record = SuiteRecord::new("quick-20260101T000000000Z-abc", "quick", true, T0);
        store.open_suite(&record).unwrap();

        let first = sealed("health-probe", T0);
        let second = sealed("health-probe", T0 + 10);
        for run in [&first, &second] {
            store.seal(run).unwrap();
            store.append(&mut record, run).unwrap();
        }

        let suite_run = SuiteRun::assemble(
            &record.id,
            "quick",
            true,
            T0,
            T0 + 20,
            false,
            vec![first.clone(), second.clone()],
            vec![],
        );
        store.close_suite(&mut record, &suite_run).unwrap();

        let stored = store.load_suite_record(&record.id).unwrap();
        assert_eq!(2, stored.scenarios.len());
        assert_eq!(first.id(), stored.scenarios[0].id);
        assert_eq!(Some(T0 + 20), stored.ended_at);
        assert_eq!(Verdict::Compliant, stored.compliance_verdict);

        let loaded = store.load_suite(&record.id).unwrap();
        assert_eq!(suite_run.compliance_verdict(), loaded.compliance_verdict());
        assert_eq!(
            vec![first.id(), second.id()],
            loaded
                .scenario_runs()
                .iter()
                .map(|r| r.id())
                .collect::<Vec<_>>()
        );

        let listed = store.list_suites().unwrap();
        assert_eq!(1, listed.len());
        assert_eq!(record.id, listed[0].id);
    }

    #[test]
    fn append_requires_a_sealed_run() {
        let (_dir, store) = store();
        let mut record = SuiteRecord::new("full-x", "full", true, T0);
        store.open_suite(&record).unwrap();

        let err = store
            .append(&mut record, &sealed("failover", T0))
            .unwrap_err();

        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(record.scenarios.is_empty());
    }

    #[test]
    fn temporary_files_are_not_left_behind() {
        let (_dir, store) = store();
        store.seal(&sealed("health-probe", T0)).unwrap();

        let leftovers = fs::read_dir(store.root().join(SCENARIOS_DIR))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(0, leftovers);
    }
}
