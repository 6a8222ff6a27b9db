//! Built-in organ configurations and stage-list builders.
//!
//! Each organ is an `OrganConfig` record; the stage lists come from two
//! builders (volumetric and mesh import) shared by every organ.

use std::sync::Arc;

use crate::adapters::{
    ArchiveFetcher, Dispatcher, InputFetcher, MeshExtractor, NiftiDirectoryReader, Segmenter,
    SurfaceNetsExtractor, VolumeReader,
};
use crate::models::{OrganConfig, PipelineDescriptor};
use crate::orchestrator::{
    DispatchStage, FetchInputStage, LocateMeshStage, PostprocessStage, PreprocessStage,
    ReadInputStage, SegmentationStage, SkipSegmentationStage, Stage, ValidateMeshStage,
};

pub const LUNG: &str = "lung_segmentation";
pub const BONE: &str = "bone_segmentation";
pub const KIDNEY: &str = "kidney_segmentation";
pub const ABDOMINAL: &str = "abdominal_segmentation";
pub const GLB_IMPORTER: &str = "glb_importer";

/// Hounsfield threshold the built-in bone segmenter labels at.
pub const BONE_HU_THRESHOLD: f32 = 300.0;

const VOLUME_FILE_TYPES: &[&str] = &["nii", "nii.gz", "dcm"];

const ABDOMINAL_LABELS: &[&str] = &[
    "background",
    "spleen",
    "right_kidney",
    "left_kidney",
    "gallbladder",
    "esophagus",
    "liver",
    "stomach",
    "aorta",
    "inferior_vena_cava",
    "portal_and_splenic_vein",
    "pancreas",
    "right_adrenal_gland",
    "left_adrenal_gland",
];

pub fn lung_config() -> OrganConfig {
    OrganConfig::new(
        PipelineDescriptor::new(LUNG, "Segments the lungs from a chest CT scan")
            .with_file_types(VOLUME_FILE_TYPES)
            .with_modalities(&["CT"])
            .with_seg_types(&["background", "lung"]),
    )
    .with_mesh_threshold(0.0)
    .with_downscale(2, Some(256))
    .with_default_seg_types(&[1])
}

pub fn bone_config() -> OrganConfig {
    OrganConfig::new(
        PipelineDescriptor::new(BONE, "Extracts bone from a CT scan by intensity thresholding")
            .with_file_types(VOLUME_FILE_TYPES)
            .with_modalities(&["CT"])
            .with_seg_types(&["background", "bone"]),
    )
    .with_mesh_threshold(0.0)
    .with_default_seg_types(&[1])
}

pub fn kidney_config() -> OrganConfig {
    OrganConfig::new(
        PipelineDescriptor::new(KIDNEY, "Segments kidneys and kidney tumors from an abdominal CT scan")
            .with_file_types(VOLUME_FILE_TYPES)
            .with_modalities(&["CT"])
            .with_seg_types(&["background", "kidney", "tumor"]),
    )
    .with_mesh_threshold(0.0)
    .with_default_seg_types(&[1, 2])
}

pub fn abdominal_config() -> OrganConfig {
    let organs: Vec<usize> = (1..ABDOMINAL_LABELS.len()).collect();
    OrganConfig::new(
        PipelineDescriptor::new(ABDOMINAL, "Segments thirteen abdominal organs from a CT scan")
            .with_file_types(VOLUME_FILE_TYPES)
            .with_modalities(&["CT"])
            .with_seg_types(ABDOMINAL_LABELS),
    )
    .with_mesh_threshold(0.0)
    .with_default_seg_types(&organs)
}

pub fn glb_importer_config() -> OrganConfig {
    OrganConfig::new(
        PipelineDescriptor::new(GLB_IMPORTER, "Imports an existing mesh for viewing")
            .with_file_types(&["glb", "obj"]),
    )
}

/// Volumetric organs and their configurations, in registration order.
pub fn volumetric_configs() -> Vec<OrganConfig> {
    vec![lung_config(), bone_config(), kidney_config(), abdominal_config()]
}

/// Adapter implementations shared by every stage list.
#[derive(Clone)]
pub struct StageAdapters {
    pub fetcher: Arc<dyn InputFetcher>,
    pub reader: Arc<dyn VolumeReader>,
    pub extractor: Arc<dyn MeshExtractor>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

impl StageAdapters {
    /// Default fetcher, reader and extractor around `dispatcher`.
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            fetcher: Arc::new(ArchiveFetcher::new()),
            reader: Arc::new(NiftiDirectoryReader::new()),
            extractor: Arc::new(SurfaceNetsExtractor::new()),
            dispatcher,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn InputFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_reader(mut self, reader: Arc<dyn VolumeReader>) -> Self {
        self.reader = reader;
        self
    }
}

/// Fetch → read → preprocess → segment → postprocess → dispatch.
pub fn volumetric_stages(
    config: &OrganConfig,
    segmenter: Arc<dyn Segmenter>,
    adapters: &StageAdapters,
) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(FetchInputStage::new(adapters.fetcher.clone())),
        Box::new(ReadInputStage::new(adapters.reader.clone())),
        Box::new(PreprocessStage::new(config.downscale_factor, config.max_depth)),
        Box::new(SegmentationStage::new(
            segmenter,
            adapters.extractor.clone(),
            config.mesh_threshold,
        )),
        Box::new(PostprocessStage::new()),
        Box::new(DispatchStage::new(adapters.dispatcher.clone())),
    ]
}

/// Fetch → locate mesh → validate → (skip) → postprocess → dispatch.
pub fn import_stages(adapters: &StageAdapters) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(FetchInputStage::new(adapters.fetcher.clone())),
        Box::new(LocateMeshStage),
        Box::new(ValidateMeshStage),
        Box::new(SkipSegmentationStage),
        Box::new(PostprocessStage::new()),
        Box::new(DispatchStage::new(adapters.dispatcher.clone())),
    ]
}
