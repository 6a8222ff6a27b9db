//! Stage implementations, one per working state.
//!
//! - `FetchInputStage` - FETCHING_INPUT
//! - `ReadInputStage` / `LocateMeshStage` - READING_INPUT
//! - `PreprocessStage` / `ValidateMeshStage` - PREPROCESSING
//! - `SegmentationStage` / `SkipSegmentationStage` - PERFORMING_SEGMENTATION
//! - `PostprocessStage` - POSTPROCESSING
//! - `DispatchStage` - DISPATCHING_OUTPUT

mod dispatch;
mod fetch;
mod import;
mod postprocess;
mod preprocess;
mod read;
mod segment;

pub use dispatch::DispatchStage;
pub use fetch::FetchInputStage;
pub use import::{LocateMeshStage, SkipSegmentationStage, ValidateMeshStage};
pub use postprocess::PostprocessStage;
pub use preprocess::{PreprocessStage, INTERMEDIATE_FILE};
pub use read::ReadInputStage;
pub use segment::{SegmentationStage, MESH_FILE, SEGMENTATION_DIR};

#[cfg(test)]
pub(crate) fn test_context(dir: &tempfile::TempDir, job_id: &str) -> super::Context {
    use crate::jobs::{Job, JobWorkspace, MedicalData};
    use crate::logging::{JobLogger, LogConfig};
    use std::sync::Arc;

    let ws = JobWorkspace::new(dir.path());
    let logger = JobLogger::new(job_id, ws.logs_dir(), LogConfig::default(), None).unwrap();
    let job = Job::new(
        Some(job_id.to_string()),
        "test_pipeline",
        "file:///study.zip",
        MedicalData::new(),
    );
    super::Context::new(&job, ws, Arc::new(logger))
}
