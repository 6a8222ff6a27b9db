//! READING_INPUT: load the unpacked study as a normalised volume.

use std::sync::Arc;

use crate::adapters::{AdapterError, VolumeReader};
use crate::jobs::JobStage;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;
use crate::orchestrator::types::{Artifacts, Context, StageOutcome};

pub struct ReadInputStage {
    reader: Arc<dyn VolumeReader>,
}

impl ReadInputStage {
    pub fn new(reader: Arc<dyn VolumeReader>) -> Self {
        Self { reader }
    }
}

impl Stage for ReadInputStage {
    fn name(&self) -> &str {
        "ReadInput"
    }

    fn state(&self) -> JobStage {
        JobStage::ReadingInput
    }

    fn description(&self) -> &str {
        "Parse the study into a normalised volume"
    }

    fn validate_input(&self, _ctx: &Context, artifacts: &Artifacts) -> StageResult<()> {
        let dir = artifacts.input_dir()?;
        if !dir.is_dir() {
            return Err(StageError::input(AdapterError::FileNotFound(dir.to_path_buf())));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, artifacts: &mut Artifacts) -> StageResult<StageOutcome> {
        let volume = self
            .reader
            .read(artifacts.input_dir()?, true)
            .map_err(StageError::input)?;

        let [x, y, z] = volume.shape();
        ctx.logger.info(&format!(
            "Loaded volume {}x{}x{} (spacing {:?})",
            x, y, z, volume.spacing
        ));
        artifacts.volume = Some(volume);
        Ok(StageOutcome::Success)
    }
}
