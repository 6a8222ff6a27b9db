//! Per-job filesystem isolation.
//!
//! Layout under the jobs root:
//!
//! ```text
//! <root>/<job_id>/input/           unpacked study
//! <root>/<job_id>/temp/<name>      intermediate files
//! <root>/<job_id>/out/<job_id>.glb final asset
//! <root>/<job_id>/state.json       state record (file store)
//! ```
//!
//! Paths depend only on `(job_id, role, name)`. Directories are created on
//! demand and creation is idempotent.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

const INPUT_DIR: &str = "input";
const TEMP_DIR: &str = "temp";
const OUT_DIR: &str = "out";
const RESULT_EXTENSION: &str = "glb";

/// Errors from workspace path resolution.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Invalid job id '{job_id}': {reason}")]
    InvalidJobId { job_id: String, reason: &'static str },

    #[error("Invalid temp file name '{name}': must be a relative path inside the temp area")]
    InvalidName { name: String },

    #[error("Failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Allocates and locates per-job directories.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
    logs_dir: PathBuf,
}

impl JobWorkspace {
    /// Workspace rooted at `root`, with logs in `<root>/logs`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let logs_dir = root.join("logs");
        Self { root, logs_dir }
    }

    /// Override where job logs are written.
    pub fn with_logs_dir(mut self, logs_dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = logs_dir.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Reject ids that could escape or alias another job's directory, or
    /// collide with the logs directory when it sits under the jobs root.
    pub fn validate_job_id(&self, job_id: &str) -> WorkspaceResult<()> {
        let reason = if job_id.is_empty() {
            Some("empty")
        } else if job_id == "." || job_id == ".." {
            Some("reserved name")
        } else if job_id.contains(['/', '\\', '\0']) {
            Some("contains a path separator")
        } else if self.reserved_name() == Some(job_id) {
            Some("names the logs directory")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(WorkspaceError::InvalidJobId {
                job_id: job_id.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// First component of the logs dir below the root, if it is below it.
    fn reserved_name(&self) -> Option<&str> {
        let relative = self.logs_dir.strip_prefix(&self.root).ok()?;
        match relative.components().next()? {
            Component::Normal(name) => name.to_str(),
            _ => None,
        }
    }

    /// The job's directory. Not created.
    pub fn job_dir(&self, job_id: &str) -> WorkspaceResult<PathBuf> {
        self.validate_job_id(job_id)?;
        Ok(self.root.join(job_id))
    }

    /// Directory receiving the job's unpacked input.
    pub fn input_directory_path(&self, job_id: &str) -> WorkspaceResult<PathBuf> {
        let dir = self.job_dir(job_id)?.join(INPUT_DIR);
        ensure_dir(&dir)?;
        Ok(dir)
    }

    /// Path of `name` inside the job's temp area.
    ///
    /// An empty `name` returns the temp root itself, for stages that need
    /// an output directory rather than a file.
    pub fn temp_file_path(&self, job_id: &str, name: &str) -> WorkspaceResult<PathBuf> {
        let temp_root = self.job_dir(job_id)?.join(TEMP_DIR);
        ensure_dir(&temp_root)?;

        if name.is_empty() {
            return Ok(temp_root);
        }

        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(WorkspaceError::InvalidName {
                name: name.to_string(),
            });
        }

        let path = temp_root.join(relative);
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        Ok(path)
    }

    /// The single path of the job's final asset.
    pub fn result_file_path(&self, job_id: &str) -> WorkspaceResult<PathBuf> {
        let out_dir = self.job_dir(job_id)?.join(OUT_DIR);
        ensure_dir(&out_dir)?;
        Ok(out_dir.join(format!("{}.{}", job_id, RESULT_EXTENSION)))
    }
}

fn ensure_dir(path: &Path) -> WorkspaceResult<()> {
    fs::create_dir_all(path).map_err(|source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn paths_are_deterministic() {
        let dir = tempdir().unwrap();
        let ws = JobWorkspace::new(dir.path());

        let a = ws.temp_file_path("job-1", "x").unwrap();
        let b = ws.temp_file_path("job-1", "x").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, dir.path().join("job-1").join("temp").join("x"));
    }

    #[test]
    fn distinct_jobs_do_not_overlap() {
        let dir = tempdir().unwrap();
        let ws = JobWorkspace::new(dir.path());

        assert_ne!(
            ws.temp_file_path("job-1", "x").unwrap(),
            ws.temp_file_path("job-2", "x").unwrap()
        );
        assert_ne!(
            ws.result_file_path("job-1").unwrap(),
            ws.result_file_path("job-2").unwrap()
        );
    }

    #[test]
    fn empty_name_is_temp_root() {
        let dir = tempdir().unwrap();
        let ws = JobWorkspace::new(dir.path());

        let root = ws.temp_file_path("job-1", "").unwrap();
        assert!(root.is_dir());
        assert!(ws.temp_file_path("job-1", "temp.nii").unwrap().starts_with(&root));
    }

    #[test]
    fn directories_created_lazily_and_idempotently() {
        let dir = tempdir().unwrap();
        let ws = JobWorkspace::new(dir.path());

        assert!(!dir.path().join("job-1").exists());
        let input = ws.input_directory_path("job-1").unwrap();
        assert!(input.is_dir());
        assert_eq!(ws.input_directory_path("job-1").unwrap(), input);

        let result = ws.result_file_path("job-1").unwrap();
        assert!(result.parent().unwrap().is_dir());
        assert!(result.ends_with("out/job-1.glb"));
    }

    #[test]
    fn rejects_escaping_ids_and_names() {
        let dir = tempdir().unwrap();
        let ws = JobWorkspace::new(dir.path());

        for bad in ["", ".", "..", "a/b", "a\\b", "logs"] {
            assert!(matches!(
                ws.input_directory_path(bad),
                Err(WorkspaceError::InvalidJobId { .. })
            ));
        }
        assert!(matches!(
            ws.temp_file_path("job-1", "../other"),
            Err(WorkspaceError::InvalidName { .. })
        ));
        assert!(matches!(
            ws.temp_file_path("job-1", "/etc/passwd"),
            Err(WorkspaceError::InvalidName { .. })
        ));
    }

    #[test]
    fn unwritable_root_is_an_io_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"not a directory").unwrap();
        let ws = JobWorkspace::new(&blocker);

        assert!(matches!(
            ws.input_directory_path("job-1"),
            Err(WorkspaceError::Io { .. })
        ));
    }

    #[test]
    fn reserved_name_follows_logs_dir() {
        let dir = tempdir().unwrap();

        let nested = JobWorkspace::new(dir.path()).with_logs_dir(dir.path().join("joblogs"));
        assert!(nested.validate_job_id("joblogs").is_err());
        assert!(nested.validate_job_id("logs").is_ok());

        let outside = JobWorkspace::new(dir.path().join("jobs"))
            .with_logs_dir(dir.path().join("logs"));
        assert!(outside.validate_job_id("logs").is_ok());
        assert!(outside.input_directory_path("logs").is_ok());
    }
}
