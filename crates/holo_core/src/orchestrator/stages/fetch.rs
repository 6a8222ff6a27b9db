//! FETCHING_INPUT: retrieve and unpack the study.

use std::fs;
use std::sync::Arc;

use crate::adapters::InputFetcher;
use crate::jobs::JobStage;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;
use crate::orchestrator::types::{Artifacts, Context, StageOutcome};

/// Unpacks the job's input endpoint into its input directory.
///
/// A re-run starts from an empty input directory so stale files from an
/// earlier attempt never leak into the new one.
pub struct FetchInputStage {
    fetcher: Arc<dyn InputFetcher>,
}

impl FetchInputStage {
    pub fn new(fetcher: Arc<dyn InputFetcher>) -> Self {
        Self { fetcher }
    }
}

impl Stage for FetchInputStage {
    fn name(&self) -> &str {
        "FetchInput"
    }

    fn state(&self) -> JobStage {
        JobStage::FetchingInput
    }

    fn description(&self) -> &str {
        "Download and unpack the imaging study"
    }

    fn validate_input(&self, ctx: &Context, _artifacts: &Artifacts) -> StageResult<()> {
        if ctx.input_endpoint.trim().is_empty() {
            return Err(StageError::invalid_input("job has no input endpoint"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, artifacts: &mut Artifacts) -> StageResult<StageOutcome> {
        let dir = ctx.workspace.input_directory_path(&ctx.job_id)?;
        let stale = fs::read_dir(&dir)
            .map_err(|e| StageError::io("inspect input directory", e))?
            .next()
            .is_some();
        if stale {
            ctx.logger.info("Clearing input from a previous run");
            fs::remove_dir_all(&dir).map_err(|e| StageError::io("clear input directory", e))?;
            fs::create_dir_all(&dir).map_err(|e| StageError::io("create input directory", e))?;
        }

        self.fetcher
            .fetch_and_unpack(&ctx.input_endpoint, &dir, &ctx.logger)
            .map_err(StageError::input)?;

        ctx.logger
            .info(&format!("Input unpacked to {}", dir.display()));
        artifacts.input_dir = Some(dir);
        Ok(StageOutcome::Success)
    }
}
