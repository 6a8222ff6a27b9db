//! DISPATCHING_OUTPUT: hand the asset to its consumer, exactly once.

use std::sync::Arc;

use crate::adapters::{DispatchRequest, Dispatcher};
use crate::jobs::JobStage;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;
use crate::orchestrator::types::{Artifacts, Context, StageOutcome};

pub struct DispatchStage {
    dispatcher: Arc<dyn Dispatcher>,
}

impl DispatchStage {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl Stage for DispatchStage {
    fn name(&self) -> &str {
        "Dispatch"
    }

    fn state(&self) -> JobStage {
        JobStage::DispatchingOutput
    }

    fn description(&self) -> &str {
        "Deliver the asset with its medical metadata"
    }

    fn validate_input(&self, _ctx: &Context, artifacts: &Artifacts) -> StageResult<()> {
        if artifacts.dispatched {
            return Err(StageError::precondition_failed("asset already dispatched"));
        }
        artifacts.result_path().map(|_| ())
    }

    fn execute(&self, ctx: &Context, artifacts: &mut Artifacts) -> StageResult<StageOutcome> {
        let request = DispatchRequest {
            job_id: &ctx.job_id,
            plid: &ctx.plid,
            medical_data: &ctx.medical_data,
            result_path: artifacts.result_path()?,
        };
        self.dispatcher
            .dispatch(&request)
            .map_err(StageError::output)?;

        artifacts.dispatched = true;
        Ok(StageOutcome::Success)
    }
}
