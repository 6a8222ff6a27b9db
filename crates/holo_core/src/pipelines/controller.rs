//! Plid → pipeline registry.
//!
//! Registration happens once at startup; callers afterwards depend only on
//! plid strings. Adding an organ means registering another
//! [`OrganPipeline`], not touching the lookup code.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use super::organs::{self, StageAdapters};
use super::{OrganPipeline, PipelineEnv, StagedPipeline};
use crate::adapters::{
    Dispatcher, ExternalSegmenter, HttpDispatcher, LocalDispatcher, Segmenter, ThresholdSegmenter,
    UnconfiguredSegmenter,
};
use crate::config::{DispatchMode, SegmentationSettings, Settings};
use crate::jobs::{FileStateStore, Job, JobStateStore, JobWorkspace};
use crate::models::PipelineDescriptor;
use crate::orchestrator::{PipelineError, PipelineRunResult};

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("No pipeline registered for plid '{plid}'")]
    NotFound { plid: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub type ControllerResult<T> = Result<T, ControllerError>;

/// Resolves plids to pipelines and answers metadata lookups.
#[derive(Default)]
pub struct PipelineController {
    pipelines: BTreeMap<String, Arc<dyn OrganPipeline>>,
}

impl PipelineController {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in pipeline, wired from `settings`.
    ///
    /// Job state goes to a [`FileStateStore`] under the jobs root so other
    /// processes can poll it.
    pub fn with_defaults(settings: &Settings) -> ControllerResult<Self> {
        let workspace = JobWorkspace::new(settings.paths.jobs_root())
            .with_logs_dir(settings.paths.logs_folder());
        let store: Arc<dyn JobStateStore> = Arc::new(FileStateStore::new(workspace.clone()));
        let env = PipelineEnv::new(workspace, store)
            .with_log_config(settings.logging.to_log_config());

        let dispatcher: Arc<dyn Dispatcher> = match settings.dispatch.mode {
            DispatchMode::Local => Arc::new(LocalDispatcher::new(&settings.dispatch.output_folder)),
            DispatchMode::Http => Arc::new(HttpDispatcher::new(&settings.dispatch.accessor_url)),
        };

        Self::with_builtins(&settings.segmentation, env, StageAdapters::new(dispatcher))
    }

    /// Registry with every built-in pipeline over the given environment.
    pub fn with_builtins(
        segmentation: &SegmentationSettings,
        env: PipelineEnv,
        adapters: StageAdapters,
    ) -> ControllerResult<Self> {
        let mut controller = Self::new();

        for config in organs::volumetric_configs() {
            let segmenter = segmenter_for(segmentation, config.plid());
            let stages = organs::volumetric_stages(&config, segmenter, &adapters);
            controller.register(Arc::new(StagedPipeline::new(config, stages, env.clone())?));
        }

        let import = organs::glb_importer_config();
        let stages = organs::import_stages(&adapters);
        controller.register(Arc::new(StagedPipeline::new(import, stages, env)?));

        Ok(controller)
    }

    /// Register `pipeline` under its plid, replacing any earlier entry.
    pub fn register(&mut self, pipeline: Arc<dyn OrganPipeline>) {
        let plid = pipeline.descriptor().plid.clone();
        tracing::debug!("Registered pipeline '{}'", plid);
        self.pipelines.insert(plid, pipeline);
    }

    /// The pipeline registered for `plid`.
    pub fn load_pipeline(&self, plid: &str) -> ControllerResult<Arc<dyn OrganPipeline>> {
        self.pipelines
            .get(plid)
            .cloned()
            .ok_or_else(|| ControllerError::NotFound {
                plid: plid.to_string(),
            })
    }

    pub fn describe(&self, plid: &str) -> ControllerResult<&PipelineDescriptor> {
        self.pipelines
            .get(plid)
            .map(|p| p.descriptor())
            .ok_or_else(|| ControllerError::NotFound {
                plid: plid.to_string(),
            })
    }

    /// Registered plids, sorted.
    pub fn plids(&self) -> Vec<&str> {
        self.pipelines.keys().map(String::as_str).collect()
    }

    pub fn get_pipeline_description(&self, plid: &str) -> ControllerResult<&str> {
        Ok(&self.describe(plid)?.description)
    }

    pub fn get_seg_types(&self, plid: &str) -> ControllerResult<&[String]> {
        Ok(&self.describe(plid)?.seg_types)
    }

    pub fn get_file_types(&self, plid: &str) -> ControllerResult<&[String]> {
        Ok(&self.describe(plid)?.file_types)
    }

    pub fn get_req_modalities(&self, plid: &str) -> ControllerResult<&[String]> {
        Ok(&self.describe(plid)?.req_modalities)
    }

    /// Segmentation vocabulary as `index: name` pairs.
    pub fn get_proc_seg_types(&self, plid: &str) -> ControllerResult<String> {
        Ok(self.describe(plid)?.proc_seg_types())
    }

    /// Resolve `job.plid` and run the job.
    pub fn run_job(&self, job: &Job) -> ControllerResult<PipelineRunResult> {
        let pipeline = self.load_pipeline(&job.plid)?;
        tracing::info!("Running job '{}' on '{}'", job.job_id, job.plid);
        Ok(pipeline.run(&job.job_id, &job.input_endpoint, &job.medical_data)?)
    }
}

/// The configured tool for `plid`; bone falls back to HU thresholding.
fn segmenter_for(settings: &SegmentationSettings, plid: &str) -> Arc<dyn Segmenter> {
    match settings.tool_for(plid) {
        Some(tool) => Arc::new(ExternalSegmenter::new(tool.clone())),
        None if plid == organs::BONE => {
            Arc::new(ThresholdSegmenter::new(organs::BONE_HU_THRESHOLD))
        }
        None => Arc::new(UnconfiguredSegmenter::new(plid)),
    }
}
