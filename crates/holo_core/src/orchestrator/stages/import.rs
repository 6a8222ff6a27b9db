//! Stages specific to importing a ready-made mesh for the viewer.
//!
//! The import pipeline shares fetch, postprocess and dispatch with the
//! organ pipelines; these stages fill the remaining states.

use crate::adapters::{collect_files, glb, obj, AdapterError, MeshFormat};
use crate::jobs::JobStage;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;
use crate::orchestrator::types::{Artifacts, Context, StageOutcome};

/// READING_INPUT: find the mesh file in the unpacked input.
///
/// GLB files are preferred over OBJ; within a format the first path in
/// sorted order wins.
#[derive(Debug, Default)]
pub struct LocateMeshStage;

impl Stage for LocateMeshStage {
    fn name(&self) -> &str {
        "LocateMesh"
    }

    fn state(&self) -> JobStage {
        JobStage::ReadingInput
    }

    fn execute(&self, ctx: &Context, artifacts: &mut Artifacts) -> StageResult<StageOutcome> {
        let dir = artifacts.input_dir()?;
        // File mode may pass the mesh itself rather than a directory.
        let files = if dir.is_file() {
            vec![dir.to_path_buf()]
        } else {
            collect_files(dir).map_err(StageError::input)?
        };

        let pick = |format: MeshFormat| {
            files
                .iter()
                .find(|p| MeshFormat::from_path(p) == Some(format))
                .cloned()
        };
        let mesh = pick(MeshFormat::Glb)
            .or_else(|| pick(MeshFormat::Obj))
            .ok_or_else(|| {
                StageError::input(AdapterError::UnsupportedFormat(format!(
                    "no .glb or .obj mesh in {}",
                    dir.display()
                )))
            })?;

        ctx.logger.info(&format!("Importing mesh {}", mesh.display()));
        artifacts.mesh_path = Some(mesh);
        Ok(StageOutcome::Success)
    }
}

/// PREPROCESSING: check the mesh is structurally sound before publishing.
#[derive(Debug, Default)]
pub struct ValidateMeshStage;

impl Stage for ValidateMeshStage {
    fn name(&self) -> &str {
        "ValidateMesh"
    }

    fn state(&self) -> JobStage {
        JobStage::Preprocessing
    }

    fn execute(&self, ctx: &Context, artifacts: &mut Artifacts) -> StageResult<StageOutcome> {
        let path = artifacts.mesh_path()?;
        match MeshFormat::from_path(path) {
            Some(MeshFormat::Glb) => {
                let info = glb::validate_glb(path).map_err(StageError::processing)?;
                ctx.logger.info(&format!(
                    "GLB ok: {} bytes, {} mesh(es)",
                    info.byte_length, info.mesh_count
                ));
            }
            Some(MeshFormat::Obj) => {
                let mesh = obj::read_mesh(path).map_err(StageError::processing)?;
                if mesh.is_empty() {
                    return Err(StageError::processing(AdapterError::EmptyMesh));
                }
                ctx.logger.info(&format!(
                    "OBJ ok: {} vertices, {} faces",
                    mesh.positions.len(),
                    mesh.face_count()
                ));
            }
            None => {
                return Err(StageError::precondition_failed(format!(
                    "unrecognised mesh format: {}",
                    path.display()
                )))
            }
        }
        Ok(StageOutcome::Success)
    }
}

/// PERFORMING_SEGMENTATION with nothing to segment.
#[derive(Debug, Default)]
pub struct SkipSegmentationStage;

impl Stage for SkipSegmentationStage {
    fn name(&self) -> &str {
        "Segmentation"
    }

    fn state(&self) -> JobStage {
        JobStage::PerformingSegmentation
    }

    fn execute(&self, _ctx: &Context, _artifacts: &mut Artifacts) -> StageResult<StageOutcome> {
        Ok(StageOutcome::Skipped(
            "input is already a surface mesh".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::stages::test_context;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn locate_prefers_glb() {
        let dir = tempdir().unwrap();
        let ctx = test_context(&dir, "job-1");
        let input = ctx.workspace.input_directory_path("job-1").unwrap();
        fs::write(input.join("a.obj"), b"v 0 0 0").unwrap();
        fs::create_dir_all(input.join("nested")).unwrap();
        fs::write(input.join("nested").join("b.glb"), b"glTF").unwrap();

        let mut artifacts = Artifacts::new().with_input_dir(&input);
        LocateMeshStage.execute(&ctx, &mut artifacts).unwrap();
        assert_eq!(artifacts.mesh_path.unwrap(), input.join("nested").join("b.glb"));
    }

    #[test]
    fn locate_without_mesh_is_input_error() {
        let dir = tempdir().unwrap();
        let ctx = test_context(&dir, "job-1");
        let input = ctx.workspace.input_directory_path("job-1").unwrap();
        fs::write(input.join("scan.nii"), b"").unwrap();

        let mut artifacts = Artifacts::new().with_input_dir(&input);
        let err = LocateMeshStage.execute(&ctx, &mut artifacts).unwrap_err();
        assert!(matches!(err, StageError::Input { .. }));
    }

    #[test]
    fn invalid_glb_fails_validation() {
        let dir = tempdir().unwrap();
        let ctx = test_context(&dir, "job-1");
        let path = dir.path().join("broken.glb");
        fs::write(&path, b"not a glb at all").unwrap();

        let mut artifacts = Artifacts::new();
        artifacts.mesh_path = Some(path);
        let err = ValidateMeshStage.execute(&ctx, &mut artifacts).unwrap_err();
        assert!(matches!(err, StageError::Processing { .. }));
    }
}
