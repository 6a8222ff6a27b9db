//! Error types for the pipeline driver.
//!
//! Errors carry context that chains through layers:
//! Job → Stage (state) → Adapter → Detail

use std::io;

use thiserror::Error;

use crate::adapters::AdapterError;
use crate::jobs::{JobStage, StateStoreError, WorkspaceError};

/// Failure classes for operators reading a job's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or corrupt archive, unreadable images.
    Input,
    /// Format conversion or downscale failure.
    Processing,
    /// Segmentation inference or mesh extraction failure.
    Algorithm,
    /// Write or dispatch failure.
    Output,
    /// Workspace or filesystem trouble not tied to one of the above.
    Internal,
}

/// Top-level pipeline error with job context.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage failed; the job's recorded state is `stage`.
    #[error("Job '{job_id}' ({plid}) failed at {stage}: {source}")]
    StageFailed {
        job_id: String,
        plid: String,
        stage: JobStage,
        #[source]
        source: StageError,
    },

    /// A state transition could not be persisted.
    #[error("Job '{job_id}' could not record state {stage}: {source}")]
    StateUpdateFailed {
        job_id: String,
        stage: JobStage,
        #[source]
        source: StateStoreError,
    },

    /// File-mode segmentation-type selection out of range.
    #[error("Invalid options for '{plid}': {message}")]
    InvalidOptions { plid: String, message: String },

    /// Stage list does not cover the working states in order.
    #[error("Invalid stage order: expected {expected}, got {found}")]
    InvalidStages { expected: String, found: String },

    /// Failed to set up the job (logger, workspace).
    #[error("Job '{job_id}' setup failed: {message}")]
    SetupFailed { job_id: String, message: String },
}

impl PipelineError {
    pub fn stage_failed(
        job_id: impl Into<String>,
        plid: impl Into<String>,
        stage: JobStage,
        source: StageError,
    ) -> Self {
        Self::StageFailed {
            job_id: job_id.into(),
            plid: plid.into(),
            stage,
            source,
        }
    }

    pub fn invalid_options(plid: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOptions {
            plid: plid.into(),
            message: message.into(),
        }
    }

    pub fn setup_failed(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            job_id: job_id.into(),
            message: message.into(),
        }
    }

    /// The stage a failed job stopped in, if a stage failed.
    pub fn failed_stage(&self) -> Option<JobStage> {
        match self {
            Self::StageFailed { stage, .. } | Self::StateUpdateFailed { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

/// Error from a pipeline stage, classified by failure class.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Input error: {source}")]
    Input {
        #[source]
        source: AdapterError,
    },

    #[error("Processing error: {source}")]
    Processing {
        #[source]
        source: AdapterError,
    },

    #[error("Algorithm error: {source}")]
    Algorithm {
        #[source]
        source: AdapterError,
    },

    #[error("Output error: {source}")]
    Output {
        #[source]
        source: AdapterError,
    },

    /// Input validation failed before the stage ran.
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// Output validation failed after the stage ran.
    #[error("Output validation failed: {0}")]
    InvalidOutput(String),

    /// An earlier stage did not leave what this one needs.
    #[error("Precondition not met: {0}")]
    PreconditionFailed(String),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl StageError {
    pub fn input(source: AdapterError) -> Self {
        Self::Input { source }
    }

    pub fn processing(source: AdapterError) -> Self {
        Self::Processing { source }
    }

    pub fn algorithm(source: AdapterError) -> Self {
        Self::Algorithm { source }
    }

    pub fn output(source: AdapterError) -> Self {
        Self::Output { source }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    /// Create an I/O error with context.
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Input { .. } | Self::InvalidInput(_) => ErrorCategory::Input,
            Self::Processing { .. } => ErrorCategory::Processing,
            Self::Algorithm { .. } => ErrorCategory::Algorithm,
            Self::Output { .. } | Self::InvalidOutput(_) => ErrorCategory::Output,
            Self::PreconditionFailed(_) | Self::Workspace(_) | Self::Io { .. } => {
                ErrorCategory::Internal
            }
        }
    }
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn stage_error_keeps_category() {
        let err = StageError::input(AdapterError::FileNotFound(PathBuf::from("/in/study.zip")));
        assert_eq!(err.category(), ErrorCategory::Input);
        assert!(err.to_string().contains("/in/study.zip"));
        assert_eq!(
            StageError::algorithm(AdapterError::EmptyMesh).category(),
            ErrorCategory::Algorithm
        );
    }

    #[test]
    fn pipeline_error_chains_context() {
        let stage_err = StageError::output(AdapterError::Upload {
            url: "http://accessor/holograms".to_string(),
            message: "HTTP 503".to_string(),
        });
        let err =
            PipelineError::stage_failed("job-42", "lung_segmentation", JobStage::DispatchingOutput, stage_err);

        let msg = err.to_string();
        assert!(msg.contains("job-42"));
        assert!(msg.contains("DISPATCHING_OUTPUT"));
        assert_eq!(err.failed_stage(), Some(JobStage::DispatchingOutput));
    }
}
