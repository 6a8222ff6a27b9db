//! Jobs: identity, workspace and lifecycle state.
//!
//! This module provides:
//! - `Job` / `MedicalData`: the request and its passthrough metadata
//! - `JobStage`: the fixed, ordered state vocabulary
//! - `JobWorkspace`: deterministic per-job input/temp/result paths
//! - `JobStateStore`: current-state persistence (`MemoryStateStore`, `FileStateStore`)

mod state;
mod types;
mod workspace;

pub use state::{FileStateStore, JobStateStore, MemoryStateStore, StateStoreError, StateStoreResult};
pub use types::{Job, JobStage, MedicalData, StateEntry, StateRecord};
pub use workspace::{JobWorkspace, WorkspaceError, WorkspaceResult};

use crate::logging::{JobLogger, LogConfig};

/// Open the job's logger in the workspace's logs directory.
pub fn get_logger_for_job(
    workspace: &JobWorkspace,
    job_id: &str,
    config: LogConfig,
) -> WorkspaceResult<JobLogger> {
    workspace.validate_job_id(job_id)?;
    JobLogger::new(job_id, workspace.logs_dir(), config, None).map_err(|source| {
        WorkspaceError::Io {
            path: workspace.logs_dir().to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn logger_lives_in_logs_dir() {
        let dir = tempdir().unwrap();
        let ws = JobWorkspace::new(dir.path()).with_logs_dir(dir.path().join("logs-here"));

        let logger = get_logger_for_job(&ws, "job-1", LogConfig::default()).unwrap();
        assert_eq!(
            logger.log_path(),
            dir.path().join("logs-here").join("job-1.log")
        );
        assert!(get_logger_for_job(&ws, "../x", LogConfig::default()).is_err());
    }

    #[test]
    fn similar_ids_do_not_share_a_log() {
        let dir = tempdir().unwrap();
        let ws = JobWorkspace::new(dir.path());

        let spaced = get_logger_for_job(&ws, "job 1", LogConfig::default()).unwrap();
        let underscored = get_logger_for_job(&ws, "job_1", LogConfig::default()).unwrap();
        assert_ne!(spaced.log_path(), underscored.log_path());
    }
}
