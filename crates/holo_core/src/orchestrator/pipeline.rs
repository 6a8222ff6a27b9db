//! Pipeline driver that records state and executes stages in sequence.

use std::path::PathBuf;

use super::errors::{PipelineError, PipelineResult, StageError};
use super::stage::Stage;
use super::types::{Artifacts, Context, StageOutcome};
use crate::jobs::{JobStage, JobStateStore};

/// Ordered stage list covering every working state.
///
/// For each stage the driver records the stage's state, then runs
/// validation and execution. `STARTED` is recorded before the first
/// stage and `FINISHED` after the last. A failing stage ends the run:
/// nothing further is recorded, so the job's current state names the
/// stage that failed.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Build a pipeline; the stages must match `JobStage::WORKING` in order.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> PipelineResult<Self> {
        let found: Vec<JobStage> = stages.iter().map(|s| s.state()).collect();
        if found != JobStage::WORKING {
            return Err(PipelineError::InvalidStages {
                expected: join_states(&JobStage::WORKING),
                found: join_states(&found),
            });
        }
        Ok(Self { stages })
    }

    /// Run every stage for a job.
    pub fn run(
        &self,
        ctx: &Context,
        store: &dyn JobStateStore,
        artifacts: &mut Artifacts,
    ) -> PipelineResult<PipelineRunResult> {
        self.drive(ctx, store, artifacts, |_| true)
    }

    /// Run only the local stages, READING_INPUT through POSTPROCESSING.
    ///
    /// The caller pre-seeds the input directory and result path in
    /// `artifacts`; nothing is fetched or dispatched.
    pub fn run_local(
        &self,
        ctx: &Context,
        store: &dyn JobStateStore,
        artifacts: &mut Artifacts,
    ) -> PipelineResult<PipelineRunResult> {
        self.drive(ctx, store, artifacts, |state| {
            !matches!(state, JobStage::FetchingInput | JobStage::DispatchingOutput)
        })
    }

    fn drive(
        &self,
        ctx: &Context,
        store: &dyn JobStateStore,
        artifacts: &mut Artifacts,
        include: impl Fn(JobStage) -> bool,
    ) -> PipelineResult<PipelineRunResult> {
        let mut result = PipelineRunResult {
            job_id: ctx.job_id.clone(),
            stages_completed: Vec::new(),
            stages_skipped: Vec::new(),
            result_path: None,
        };

        record(ctx, store, JobStage::Started)?;

        for stage in self.stages.iter().filter(|s| include(s.state())) {
            let state = stage.state();
            record(ctx, store, state)?;
            ctx.logger.debug(&format!("Running '{}'", stage.description()));

            let outcome = stage
                .validate_input(ctx, artifacts)
                .and_then(|_| stage.execute(ctx, artifacts))
                .map_err(|e| fail(ctx, stage.as_ref(), e))?;

            match outcome {
                StageOutcome::Success => {
                    stage
                        .validate_output(ctx, artifacts)
                        .map_err(|e| fail(ctx, stage.as_ref(), e))?;
                    ctx.logger.success(&format!("{} completed", stage.name()));
                    result.stages_completed.push(state);
                }
                StageOutcome::Skipped(reason) => {
                    ctx.logger
                        .info(&format!("{} skipped: {}", stage.name(), reason));
                    result.stages_skipped.push((state, reason));
                }
            }
        }

        record(ctx, store, JobStage::Finished)?;
        ctx.logger.success("Pipeline completed successfully");
        ctx.logger.flush();

        result.result_path = artifacts.result_path.clone();
        Ok(result)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Stage names in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

fn record(ctx: &Context, store: &dyn JobStateStore, state: JobStage) -> PipelineResult<()> {
    tracing::info!(job_id = %ctx.job_id, plid = %ctx.plid, "{}", state);
    store
        .update(&ctx.job_id, state, &ctx.logger)
        .map_err(|source| {
            ctx.logger
                .error(&format!("Could not record state {}: {}", state, source));
            ctx.logger.flush();
            PipelineError::StateUpdateFailed {
                job_id: ctx.job_id.clone(),
                stage: state,
                source,
            }
        })
}

fn fail(ctx: &Context, stage: &dyn Stage, error: StageError) -> PipelineError {
    ctx.logger
        .error(&format!("{} failed: {}", stage.name(), error));
    ctx.logger.show_tail(stage.name());
    ctx.logger.flush();
    tracing::error!(
        job_id = %ctx.job_id,
        plid = %ctx.plid,
        state = %stage.state(),
        "Stage failed: {}",
        error
    );
    PipelineError::stage_failed(&ctx.job_id, &ctx.plid, stage.state(), error)
}

fn join_states(states: &[JobStage]) -> String {
    states
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRunResult {
    pub job_id: String,
    /// States whose stage completed successfully.
    pub stages_completed: Vec<JobStage>,
    /// States whose stage had nothing to do, with the reason.
    pub stages_skipped: Vec<(JobStage, String)>,
    /// The final asset, when one was produced.
    pub result_path: Option<PathBuf>,
}

impl PipelineRunResult {
    /// Check if all stages completed (none skipped).
    pub fn all_completed(&self) -> bool {
        self.stages_skipped.is_empty()
    }

    /// Total number of stages that ran.
    pub fn total_stages(&self) -> usize {
        self.stages_completed.len() + self.stages_skipped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{
        Job, JobWorkspace, MedicalData, MemoryStateStore, StateRecord, StateStoreError,
        StateStoreResult,
    };
    use crate::logging::{JobLogger, LogConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    struct CountingStage {
        state: JobStage,
        fail: bool,
        skip: bool,
        executed: Arc<AtomicUsize>,
    }

    impl Stage for CountingStage {
        fn name(&self) -> &str {
            self.state.as_str()
        }

        fn state(&self) -> JobStage {
            self.state
        }

        fn execute(&self, _ctx: &Context, _artifacts: &mut Artifacts) -> Result<StageOutcome, StageError> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StageError::invalid_input("boom"));
            }
            if self.skip {
                return Ok(StageOutcome::Skipped("nothing to do".to_string()));
            }
            Ok(StageOutcome::Success)
        }
    }

    /// Store that accepts `limit` writes and then fails.
    struct FlakyStore {
        inner: MemoryStateStore,
        limit: usize,
        writes: AtomicUsize,
    }

    impl JobStateStore for FlakyStore {
        fn record(&self, job_id: &str, state: JobStage) -> StateStoreResult<StateRecord> {
            if self.writes.fetch_add(1, Ordering::SeqCst) >= self.limit {
                return Err(StateStoreError::Io {
                    job_id: job_id.to_string(),
                    operation: "write",
                    source: std::io::Error::other("disk full"),
                });
            }
            self.inner.record(job_id, state)
        }

        fn get(&self, job_id: &str) -> StateStoreResult<StateRecord> {
            self.inner.get(job_id)
        }
    }

    fn stages(fail_at: Option<JobStage>, skip_at: Option<JobStage>) -> (Vec<Box<dyn Stage>>, Arc<AtomicUsize>) {
        let executed = Arc::new(AtomicUsize::new(0));
        let stages = JobStage::WORKING
            .iter()
            .map(|&state| {
                Box::new(CountingStage {
                    state,
                    fail: fail_at == Some(state),
                    skip: skip_at == Some(state),
                    executed: Arc::clone(&executed),
                }) as Box<dyn Stage>
            })
            .collect();
        (stages, executed)
    }

    fn context(dir: &TempDir) -> Context {
        let ws = JobWorkspace::new(dir.path());
        let logger = JobLogger::new("job-1", ws.logs_dir(), LogConfig::default(), None).unwrap();
        let job = Job::new(Some("job-1".into()), "test_pipeline", "file:///x.zip", MedicalData::new());
        Context::new(&job, ws, Arc::new(logger))
    }

    #[test]
    fn records_every_state_in_order() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let store = MemoryStateStore::new();
        let (stages, executed) = stages(None, None);
        let pipeline = Pipeline::new(stages).unwrap();

        let result = pipeline.run(&ctx, &store, &mut Artifacts::new()).unwrap();

        assert_eq!(executed.load(Ordering::SeqCst), 6);
        assert_eq!(store.history("job-1").unwrap(), JobStage::ALL.to_vec());
        assert!(result.all_completed());
    }

    #[test]
    fn failure_stops_at_failing_state() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let store = MemoryStateStore::new();
        let (stages, executed) = stages(Some(JobStage::Preprocessing), None);
        let pipeline = Pipeline::new(stages).unwrap();

        let err = pipeline.run(&ctx, &store, &mut Artifacts::new()).unwrap_err();

        assert_eq!(err.failed_stage(), Some(JobStage::Preprocessing));
        assert_eq!(store.current("job-1").unwrap(), JobStage::Preprocessing);
        assert_eq!(executed.load(Ordering::SeqCst), 3);
        assert!(!store.history("job-1").unwrap().contains(&JobStage::Finished));
    }

    #[test]
    fn skipped_stage_still_records_state() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let store = MemoryStateStore::new();
        let (stages, _) = stages(None, Some(JobStage::PerformingSegmentation));

        let result = Pipeline::new(stages)
            .unwrap()
            .run(&ctx, &store, &mut Artifacts::new())
            .unwrap();

        assert_eq!(store.history("job-1").unwrap(), JobStage::ALL.to_vec());
        assert_eq!(result.stages_skipped.len(), 1);
        assert_eq!(result.stages_skipped[0].0, JobStage::PerformingSegmentation);
    }

    #[test]
    fn local_run_skips_fetch_and_dispatch() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let store = MemoryStateStore::new();
        let (stages, executed) = stages(None, None);

        Pipeline::new(stages)
            .unwrap()
            .run_local(&ctx, &store, &mut Artifacts::new())
            .unwrap();

        assert_eq!(executed.load(Ordering::SeqCst), 4);
        assert_eq!(
            store.history("job-1").unwrap(),
            vec![
                JobStage::Started,
                JobStage::ReadingInput,
                JobStage::Preprocessing,
                JobStage::PerformingSegmentation,
                JobStage::Postprocessing,
                JobStage::Finished,
            ]
        );
    }

    #[test]
    fn rejects_out_of_order_stages() {
        let (mut swapped, _) = stages(None, None);
        swapped.swap(1, 2);
        assert!(matches!(
            Pipeline::new(swapped),
            Err(PipelineError::InvalidStages { .. })
        ));

        let (mut short, _) = stages(None, None);
        short.pop();
        assert!(Pipeline::new(short).is_err());
    }

    #[test]
    fn state_write_failure_is_propagated() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let store = FlakyStore {
            inner: MemoryStateStore::new(),
            limit: 2,
            writes: AtomicUsize::new(0),
        };
        let (stages, executed) = stages(None, None);

        let err = Pipeline::new(stages)
            .unwrap()
            .run(&ctx, &store, &mut Artifacts::new())
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::StateUpdateFailed {
                stage: JobStage::ReadingInput,
                ..
            }
        ));
        assert_eq!(executed.load(Ordering::SeqCst), 1);
    }
}
