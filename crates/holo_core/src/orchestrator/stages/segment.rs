//! PERFORMING_SEGMENTATION: label the volume and extract its surface.
//!
//! Mesh extraction runs here rather than in its own stage, so the
//! recorded state stays PERFORMING_SEGMENTATION until the surface exists.

use std::fs;
use std::sync::Arc;

use crate::adapters::{nifti, obj, MeshExtractor, MeshRequest, Segmenter};
use crate::jobs::JobStage;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;
use crate::orchestrator::types::{Artifacts, Context, StageOutcome};

/// Directory (inside the temp area) the segmenter writes into.
pub const SEGMENTATION_DIR: &str = "segmentation";
/// Intermediate surface handed to postprocessing.
pub const MESH_FILE: &str = "temp.obj";

pub struct SegmentationStage {
    segmenter: Arc<dyn Segmenter>,
    extractor: Arc<dyn MeshExtractor>,
    mesh_threshold: f32,
}

impl SegmentationStage {
    pub fn new(
        segmenter: Arc<dyn Segmenter>,
        extractor: Arc<dyn MeshExtractor>,
        mesh_threshold: f32,
    ) -> Self {
        Self {
            segmenter,
            extractor,
            mesh_threshold,
        }
    }
}

impl Stage for SegmentationStage {
    fn name(&self) -> &str {
        "Segmentation"
    }

    fn state(&self) -> JobStage {
        JobStage::PerformingSegmentation
    }

    fn description(&self) -> &str {
        "Run segmentation and extract the surface mesh"
    }

    fn validate_input(&self, _ctx: &Context, artifacts: &Artifacts) -> StageResult<()> {
        artifacts.intermediate_path().map(|_| ())
    }

    fn execute(&self, ctx: &Context, artifacts: &mut Artifacts) -> StageResult<StageOutcome> {
        let output_dir = ctx.workspace.temp_file_path(&ctx.job_id, SEGMENTATION_DIR)?;
        if output_dir.exists() {
            fs::remove_dir_all(&output_dir)
                .map_err(|e| StageError::io("clear segmentation output", e))?;
        }
        fs::create_dir_all(&output_dir)
            .map_err(|e| StageError::io("create segmentation output", e))?;

        let segmented = self
            .segmenter
            .segment(artifacts.intermediate_path()?, &output_dir, &ctx.logger)
            .map_err(StageError::algorithm)?;
        ctx.logger
            .info(&format!("Segmentation written to {}", segmented.display()));

        // Labels are already in their final range; no intensity scaling.
        let labels = nifti::read_volume(&segmented, false).map_err(StageError::algorithm)?;
        let request = MeshRequest::new(self.mesh_threshold, ctx.seg_types.clone());
        let mesh = self
            .extractor
            .extract(&labels, &request)
            .map_err(StageError::algorithm)?;
        ctx.logger.info(&format!(
            "Extracted surface: {} vertices, {} faces",
            mesh.positions.len(),
            mesh.face_count()
        ));

        let mesh_path = ctx.workspace.temp_file_path(&ctx.job_id, MESH_FILE)?;
        obj::write_mesh(&mesh, &mesh_path).map_err(StageError::output)?;

        artifacts.segmented_path = Some(segmented);
        artifacts.mesh_path = Some(mesh_path);
        Ok(StageOutcome::Success)
    }
}
