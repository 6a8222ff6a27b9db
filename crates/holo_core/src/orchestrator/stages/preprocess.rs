//! PREPROCESSING: reduce the volume and persist the intermediate file.

use crate::adapters::{nifti, preprocess};
use crate::jobs::JobStage;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;
use crate::orchestrator::types::{Artifacts, Context, StageOutcome};

/// Intermediate volume handed to segmentation.
pub const INTERMEDIATE_FILE: &str = "temp.nii";

/// Downscales, conditionally crops, and writes the intermediate volume.
pub struct PreprocessStage {
    downscale_factor: usize,
    max_depth: Option<usize>,
}

impl PreprocessStage {
    pub fn new(downscale_factor: usize, max_depth: Option<usize>) -> Self {
        Self {
            downscale_factor,
            max_depth,
        }
    }
}

impl Stage for PreprocessStage {
    fn name(&self) -> &str {
        "Preprocess"
    }

    fn state(&self) -> JobStage {
        JobStage::Preprocessing
    }

    fn description(&self) -> &str {
        "Downscale and crop into the intermediate volume format"
    }

    fn validate_input(&self, _ctx: &Context, artifacts: &Artifacts) -> StageResult<()> {
        artifacts.volume().map(|_| ())
    }

    fn execute(&self, ctx: &Context, artifacts: &mut Artifacts) -> StageResult<StageOutcome> {
        let reduced = preprocess::downscale_and_conditionally_crop(
            artifacts.volume()?,
            self.downscale_factor,
            self.max_depth,
        )
        .map_err(StageError::processing)?;

        let [x, y, z] = reduced.shape();
        ctx.logger.info(&format!(
            "Preprocessed to {}x{}x{} (factor {}, depth bound {:?})",
            x, y, z, self.downscale_factor, self.max_depth
        ));

        let path = ctx.workspace.temp_file_path(&ctx.job_id, INTERMEDIATE_FILE)?;
        nifti::write_volume(&reduced, &path).map_err(StageError::processing)?;
        artifacts.intermediate_path = Some(path);
        Ok(StageOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, artifacts: &Artifacts) -> StageResult<()> {
        let path = artifacts.intermediate_path()?;
        if !path.is_file() {
            return Err(StageError::invalid_output(format!(
                "intermediate volume missing at {}",
                path.display()
            )));
        }
        Ok(())
    }
}
