//! The shared pipeline implementation.

use std::path::Path;
use std::sync::Arc;

use super::OrganPipeline;
use crate::jobs::{get_logger_for_job, Job, JobStateStore, JobWorkspace, MedicalData, MemoryStateStore};
use crate::logging::{JobLoggerBuilder, LogConfig};
use crate::models::{OrganConfig, PipelineDescriptor};
use crate::orchestrator::{
    Artifacts, Context, Pipeline, PipelineError, PipelineResult, PipelineRunResult, Stage,
};

/// Where job-oriented runs keep their files, state and logs.
#[derive(Clone)]
pub struct PipelineEnv {
    pub workspace: JobWorkspace,
    pub store: Arc<dyn JobStateStore>,
    pub log_config: LogConfig,
}

impl PipelineEnv {
    pub fn new(workspace: JobWorkspace, store: Arc<dyn JobStateStore>) -> Self {
        Self {
            workspace,
            store,
            log_config: LogConfig::default(),
        }
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }
}

/// An organ configuration driven through the generic stage list.
///
/// Organs differ only in their `OrganConfig` and the stages they were
/// built with; the control flow is the driver's.
pub struct StagedPipeline {
    config: OrganConfig,
    pipeline: Pipeline,
    env: PipelineEnv,
}

impl StagedPipeline {
    /// Fails when `stages` does not cover the working states in order.
    pub fn new(
        config: OrganConfig,
        stages: Vec<Box<dyn Stage>>,
        env: PipelineEnv,
    ) -> PipelineResult<Self> {
        Ok(Self {
            config,
            pipeline: Pipeline::new(stages)?,
            env,
        })
    }

    pub fn config(&self) -> &OrganConfig {
        &self.config
    }

    pub fn env(&self) -> &PipelineEnv {
        &self.env
    }
}

impl OrganPipeline for StagedPipeline {
    fn descriptor(&self) -> &PipelineDescriptor {
        &self.config.descriptor
    }

    fn run(
        &self,
        job_id: &str,
        input_endpoint: &str,
        medical_data: &MedicalData,
    ) -> PipelineResult<PipelineRunResult> {
        let job = Job::new(
            Some(job_id.to_string()),
            self.config.plid(),
            input_endpoint,
            medical_data.clone(),
        );
        let logger = get_logger_for_job(&self.env.workspace, job_id, self.env.log_config.clone())
            .map_err(|e| PipelineError::setup_failed(job_id, e.to_string()))?;
        logger.info(&format!(
            "Job '{}' on pipeline '{}' from {}",
            job_id,
            self.config.plid(),
            input_endpoint
        ));

        let ctx = Context::new(&job, self.env.workspace.clone(), Arc::new(logger));
        let mut artifacts = Artifacts::new();
        self.pipeline
            .run(&ctx, self.env.store.as_ref(), &mut artifacts)
    }

    fn run_file(
        &self,
        input: &Path,
        output: &Path,
        options: &[usize],
    ) -> PipelineResult<PipelineRunResult> {
        let plid = self.config.plid();
        self.config
            .validate_seg_types(options)
            .map_err(|message| PipelineError::invalid_options(plid, message))?;

        let job_id = format!("local-{}", Job::generate_id());
        let scratch = tempfile::Builder::new()
            .prefix("holo-")
            .tempdir()
            .map_err(|e| PipelineError::setup_failed(&job_id, e.to_string()))?;
        let workspace = JobWorkspace::new(scratch.path());

        // No log file survives the scratch dir, so lines go to the terminal.
        let logger = JobLoggerBuilder::new(&job_id, workspace.logs_dir())
            .config(self.env.log_config.clone())
            .callback(Box::new(|line: &str| tracing::info!("{}", line)))
            .build()
            .map_err(|e| PipelineError::setup_failed(&job_id, e.to_string()))?;

        let job = Job::new(
            Some(job_id.clone()),
            plid,
            input.display().to_string(),
            MedicalData::new(),
        );
        let ctx = Context::new(&job, workspace, Arc::new(logger))
            .with_seg_types(self.config.effective_seg_types(options));
        let mut artifacts = Artifacts::new()
            .with_input_dir(input)
            .with_result_path(output);

        // Detached store: file-mode runs are not visible to pollers.
        let store = MemoryStateStore::new();
        self.pipeline.run_local(&ctx, &store, &mut artifacts)
    }
}
