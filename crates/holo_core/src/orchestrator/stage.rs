//! Stage trait definition.
//!
//! Every unit of pipeline work implements this trait. The driver calls,
//! in order, after recording `state()`:
//!
//! 1. `validate_input` - check what earlier stages left in the artifacts
//! 2. `execute` - do the work and record results in the artifacts
//! 3. `validate_output` - only when `execute` returned `Success`

use super::errors::StageResult;
use super::types::{Artifacts, Context, StageOutcome};
use crate::jobs::JobStage;

/// One step of a pipeline, bound to a single job state.
pub trait Stage: Send + Sync {
    /// Stage name for logs and error context.
    fn name(&self) -> &str;

    /// The state recorded before this stage executes.
    fn state(&self) -> JobStage;

    fn validate_input(&self, _ctx: &Context, _artifacts: &Artifacts) -> StageResult<()> {
        Ok(())
    }

    /// Perform the stage's work.
    ///
    /// Returns `StageOutcome::Skipped` when the pipeline has nothing to do
    /// at this state; that is not an error.
    fn execute(&self, ctx: &Context, artifacts: &mut Artifacts) -> StageResult<StageOutcome>;

    fn validate_output(&self, _ctx: &Context, _artifacts: &Artifacts) -> StageResult<()> {
        Ok(())
    }

    /// Human-readable description of what this stage does.
    fn description(&self) -> &str {
        self.name()
    }
}
