//! Core types for the pipeline driver.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::errors::{StageError, StageResult};
use crate::jobs::{Job, JobStage, JobWorkspace, MedicalData};
use crate::logging::JobLogger;
use crate::models::Volume;

/// Read-only context passed to stages.
///
/// Holds the job request and shared resources. Everything stages
/// produce goes in [`Artifacts`].
pub struct Context {
    pub job_id: String,
    pub plid: String,
    /// URL or path of the source archive.
    pub input_endpoint: String,
    /// Forwarded to dispatch untouched.
    pub medical_data: MedicalData,
    pub workspace: JobWorkspace,
    pub logger: Arc<JobLogger>,
    /// Label values to mesh; empty means every voxel above the threshold.
    pub seg_types: Vec<usize>,
}

impl Context {
    /// Context for running `job` inside `workspace`.
    pub fn new(job: &Job, workspace: JobWorkspace, logger: Arc<JobLogger>) -> Self {
        Self {
            job_id: job.job_id.clone(),
            plid: job.plid.clone(),
            input_endpoint: job.input_endpoint.clone(),
            medical_data: job.medical_data.clone(),
            workspace,
            logger,
            seg_types: Vec::new(),
        }
    }

    /// Restrict meshing to these label values.
    pub fn with_seg_types(mut self, seg_types: Vec<usize>) -> Self {
        self.seg_types = seg_types;
        self
    }
}

/// What a stage reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    /// Nothing to do at this state; the reason is logged.
    Skipped(String),
}

/// Manifest of what stages have produced so far.
///
/// By convention each stage fills only its own slot and reads earlier
/// ones; the fields are plain data and nothing enforces this. File-mode
/// runs pre-seed `input_dir` and `result_path`, which the owning stages
/// then use instead of the workspace defaults.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    /// Unpacked study (FETCHING_INPUT).
    pub input_dir: Option<PathBuf>,
    /// Normalised volume (READING_INPUT).
    pub volume: Option<Volume>,
    /// Reduced volume in the intermediate format (PREPROCESSING).
    pub intermediate_path: Option<PathBuf>,
    /// Label volume written by the segmenter (PERFORMING_SEGMENTATION).
    pub segmented_path: Option<PathBuf>,
    /// Surface in an intermediate or source mesh format.
    pub mesh_path: Option<PathBuf>,
    /// Final asset (POSTPROCESSING).
    pub result_path: Option<PathBuf>,
    /// Set once the dispatcher accepted the asset.
    pub dispatched: bool,
}

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_dir = Some(dir.into());
        self
    }

    pub fn with_result_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.result_path = Some(path.into());
        self
    }

    pub fn input_dir(&self) -> StageResult<&Path> {
        require(self.input_dir.as_deref(), "unpacked input", JobStage::FetchingInput)
    }

    pub fn volume(&self) -> StageResult<&Volume> {
        require(self.volume.as_ref(), "volume", JobStage::ReadingInput)
    }

    pub fn intermediate_path(&self) -> StageResult<&Path> {
        require(
            self.intermediate_path.as_deref(),
            "intermediate volume",
            JobStage::Preprocessing,
        )
    }

    pub fn mesh_path(&self) -> StageResult<&Path> {
        require(
            self.mesh_path.as_deref(),
            "mesh",
            JobStage::PerformingSegmentation,
        )
    }

    pub fn result_path(&self) -> StageResult<&Path> {
        require(self.result_path.as_deref(), "result asset", JobStage::Postprocessing)
    }
}

fn require<'a, T: ?Sized>(slot: Option<&'a T>, what: &str, producer: JobStage) -> StageResult<&'a T> {
    slot.ok_or_else(|| {
        StageError::precondition_failed(format!("no {} recorded (produced by {})", what, producer))
    })
}
