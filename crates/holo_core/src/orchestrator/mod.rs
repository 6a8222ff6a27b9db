//! Pipeline driver: an ordered stage list interpreted by one generic loop.
//!
//! Every pipeline has one stage per working state. The driver records
//! each state before running its stage, so the job's current state always
//! names the stage in progress or the one that failed.
//!
//! # Architecture
//!
//! ```text
//! Pipeline
//!     ├── STARTED
//!     ├── Stage: FetchInput        (FETCHING_INPUT)
//!     ├── Stage: ReadInput         (READING_INPUT)
//!     ├── Stage: Preprocess        (PREPROCESSING)
//!     ├── Stage: Segmentation      (PERFORMING_SEGMENTATION)
//!     ├── Stage: Postprocess       (POSTPROCESSING)
//!     ├── Stage: Dispatch          (DISPATCHING_OUTPUT)
//!     └── FINISHED
//! ```
//!
//! # Example
//!
//! ```ignore
//! use holo_core::orchestrator::{Artifacts, Context, Pipeline};
//!
//! let pipeline = Pipeline::new(stages)?;
//! let ctx = Context::new(&job, workspace, logger);
//! let mut artifacts = Artifacts::new();
//!
//! let result = pipeline.run(&ctx, &store, &mut artifacts)?;
//! println!("Asset: {:?}", result.result_path);
//! ```

mod errors;
mod pipeline;
mod stage;
pub mod stages;
mod types;

pub use errors::{
    ErrorCategory, PipelineError, PipelineResult, StageError, StageResult,
};
pub use pipeline::{Pipeline, PipelineRunResult};
pub use stage::Stage;
pub use stages::{
    DispatchStage, FetchInputStage, LocateMeshStage, PostprocessStage, PreprocessStage,
    ReadInputStage, SegmentationStage, SkipSegmentationStage, ValidateMeshStage,
};
pub use types::{Artifacts, Context, StageOutcome};
