//! Job state stores.
//!
//! A store keeps the last recorded `JobStage` per job id. Only the pipeline
//! driving a job writes its entry; pollers read it. Nothing here ever writes
//! a failure marker: a failed job keeps whatever state was recorded last.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use parking_lot::Mutex;
use thiserror::Error;

use super::types::{JobStage, StateRecord};
use super::workspace::{JobWorkspace, WorkspaceError};
use crate::logging::JobLogger;

const STATE_FILE: &str = "state.json";

/// Errors from state persistence and lookup.
#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("No state recorded for job '{job_id}'")]
    NotFound { job_id: String },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("Failed to {operation} state for job '{job_id}': {source}")]
    Io {
        job_id: String,
        operation: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt state record for job '{job_id}': {source}")]
    Corrupt {
        job_id: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type StateStoreResult<T> = Result<T, StateStoreError>;

/// Persists and reports the lifecycle state of jobs.
pub trait JobStateStore: Send + Sync {
    /// Persist `state` as current for `job_id` and return the new record.
    fn record(&self, job_id: &str, state: JobStage) -> StateStoreResult<StateRecord>;

    /// Full record for `job_id`.
    fn get(&self, job_id: &str) -> StateStoreResult<StateRecord>;

    /// Record a transition and log it to the job log.
    ///
    /// Persistence failures are returned, never swallowed.
    fn update(&self, job_id: &str, state: JobStage, logger: &JobLogger) -> StateStoreResult<()> {
        self.record(job_id, state)?;
        logger.stage(state);
        Ok(())
    }

    /// Most recently recorded state.
    fn current(&self, job_id: &str) -> StateStoreResult<JobStage> {
        self.get(job_id).map(|record| record.state)
    }

    /// Every recorded state for the job, oldest first.
    fn history(&self, job_id: &str) -> StateStoreResult<Vec<JobStage>> {
        self.get(job_id)
            .map(|record| record.history.iter().map(|e| e.state).collect())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<HashMap<String, StateRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Job ids with a recorded state.
    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl JobStateStore for MemoryStateStore {
    fn record(&self, job_id: &str, state: JobStage) -> StateStoreResult<StateRecord> {
        let mut records = self.records.lock();
        let record = records
            .entry(job_id.to_string())
            .and_modify(|r| r.push(state))
            .or_insert_with(|| StateRecord::new(job_id, state));
        Ok(record.clone())
    }

    fn get(&self, job_id: &str) -> StateStoreResult<StateRecord> {
        self.records
            .lock()
            .get(job_id)
            .cloned()
            .ok_or_else(|| StateStoreError::NotFound {
                job_id: job_id.to_string(),
            })
    }
}

/// Store keeping one JSON document per job inside its workspace.
///
/// Writes go through a temp file and a rename so readers in other
/// processes never observe a partially written record.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    workspace: JobWorkspace,
}

impl FileStateStore {
    pub fn new(workspace: JobWorkspace) -> Self {
        Self { workspace }
    }

    fn state_path(&self, job_id: &str) -> StateStoreResult<PathBuf> {
        Ok(self.workspace.job_dir(job_id)?.join(STATE_FILE))
    }

    fn read(&self, job_id: &str) -> StateStoreResult<Option<StateRecord>> {
        let path = self.state_path(job_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StateStoreError::Io {
                    job_id: job_id.to_string(),
                    operation: "read",
                    source,
                })
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StateStoreError::Corrupt {
                job_id: job_id.to_string(),
                source,
            })
    }

    fn write(&self, record: &StateRecord) -> StateStoreResult<()> {
        let io_err = |source| StateStoreError::Io {
            job_id: record.job_id.clone(),
            operation: "write",
            source,
        };

        let path = self.state_path(&record.job_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(record).map_err(|source| {
            StateStoreError::Corrupt {
                job_id: record.job_id.clone(),
                source,
            }
        })?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, json).map_err(io_err)?;
        fs::rename(&temp_path, &path).map_err(io_err)?;
        Ok(())
    }

    /// Job ids with a state file under the jobs root.
    pub fn list(&self) -> io::Result<Vec<String>> {
        let root = self.workspace.root();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(root)? {
            let path = entry?.path();
            if path.join(STATE_FILE).is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl JobStateStore for FileStateStore {
    fn record(&self, job_id: &str, state: JobStage) -> StateStoreResult<StateRecord> {
        let record = match self.read(job_id)? {
            Some(mut record) => {
                record.push(state);
                record
            }
            None => StateRecord::new(job_id, state),
        };
        self.write(&record)?;
        tracing::debug!("Recorded state {} for job '{}'", state, job_id);
        Ok(record)
    }

    fn get(&self, job_id: &str) -> StateStoreResult<StateRecord> {
        self.read(job_id)?.ok_or_else(|| StateStoreError::NotFound {
            job_id: job_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogConfig;
    use tempfile::tempdir;

    fn logger(dir: &std::path::Path, job_id: &str) -> JobLogger {
        JobLogger::new(job_id, dir, LogConfig::default(), None).unwrap()
    }

    #[test]
    fn memory_store_tracks_last_state() {
        let dir = tempdir().unwrap();
        let store = MemoryStateStore::new();
        let log = logger(dir.path(), "job-1");

        store.update("job-1", JobStage::Started, &log).unwrap();
        store.update("job-1", JobStage::FetchingInput, &log).unwrap();

        assert_eq!(store.current("job-1").unwrap(), JobStage::FetchingInput);
        assert_eq!(
            store.history("job-1").unwrap(),
            vec![JobStage::Started, JobStage::FetchingInput]
        );
        assert_eq!(store.job_ids(), vec!["job-1".to_string()]);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let dir = tempdir().unwrap();
        let memory = MemoryStateStore::new();
        let file = FileStateStore::new(JobWorkspace::new(dir.path()));

        assert!(matches!(
            memory.current("nope"),
            Err(StateStoreError::NotFound { .. })
        ));
        assert!(matches!(
            file.current("nope"),
            Err(StateStoreError::NotFound { .. })
        ));
    }

    #[test]
    fn update_logs_transition() {
        let dir = tempdir().unwrap();
        let store = MemoryStateStore::new();
        let log = logger(dir.path(), "job-1");

        store.update("job-1", JobStage::ReadingInput, &log).unwrap();
        log.flush();

        let content = fs::read_to_string(log.log_path()).unwrap();
        assert!(content.contains("=== READING_INPUT (3/8) ==="));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let ws = JobWorkspace::new(dir.path());
        let log = logger(dir.path(), "job-1");

        let writer = FileStateStore::new(ws.clone());
        writer.update("job-1", JobStage::Started, &log).unwrap();
        writer.update("job-1", JobStage::FetchingInput, &log).unwrap();

        let reader = FileStateStore::new(ws);
        assert_eq!(reader.current("job-1").unwrap(), JobStage::FetchingInput);
        assert_eq!(reader.history("job-1").unwrap().len(), 2);
        assert_eq!(reader.list().unwrap(), vec!["job-1".to_string()]);
        assert!(!dir.path().join("job-1").join("state.json.tmp").exists());
    }

    #[test]
    fn file_store_reports_corrupt_record() {
        let dir = tempdir().unwrap();
        let ws = JobWorkspace::new(dir.path());
        fs::create_dir_all(dir.path().join("job-1")).unwrap();
        fs::write(dir.path().join("job-1").join("state.json"), "{not json").unwrap();

        let store = FileStateStore::new(ws);
        assert!(matches!(
            store.current("job-1"),
            Err(StateStoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn file_store_write_failure_propagates() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("root");
        fs::write(&blocker, b"file, not dir").unwrap();
        let store = FileStateStore::new(JobWorkspace::new(&blocker));
        let log = logger(dir.path(), "job-1");

        assert!(store.update("job-1", JobStage::Started, &log).is_err());
    }
}
