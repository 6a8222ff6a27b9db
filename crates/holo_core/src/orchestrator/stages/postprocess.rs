//! POSTPROCESSING: publish the surface as the job's GLB asset.

use std::fs;

use crate::adapters::{glb, obj, MeshFormat};
use crate::jobs::JobStage;
use crate::orchestrator::errors::{StageError, StageResult};
use crate::orchestrator::stage::Stage;
use crate::orchestrator::types::{Artifacts, Context, StageOutcome};

/// Converts the surface to GLB at the job's single result path.
///
/// OBJ surfaces are converted; GLB surfaces (mesh import) are copied after
/// validation. A pre-seeded result path (file mode) overrides the
/// workspace location. Re-running overwrites the previous asset.
#[derive(Debug, Default)]
pub struct PostprocessStage;

impl PostprocessStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for PostprocessStage {
    fn name(&self) -> &str {
        "Postprocess"
    }

    fn state(&self) -> JobStage {
        JobStage::Postprocessing
    }

    fn description(&self) -> &str {
        "Convert the surface into the final GLB asset"
    }

    fn validate_input(&self, _ctx: &Context, artifacts: &Artifacts) -> StageResult<()> {
        let mesh = artifacts.mesh_path()?;
        if MeshFormat::from_path(mesh).is_none() {
            return Err(StageError::precondition_failed(format!(
                "unrecognised mesh format: {}",
                mesh.display()
            )));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, artifacts: &mut Artifacts) -> StageResult<StageOutcome> {
        let result = match &artifacts.result_path {
            Some(path) => path.clone(),
            None => ctx.workspace.result_file_path(&ctx.job_id)?,
        };
        if let Some(parent) = result.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StageError::io("create result directory", e))?;
        }

        let mesh_path = artifacts.mesh_path()?;
        match MeshFormat::from_path(mesh_path) {
            Some(MeshFormat::Glb) => {
                glb::validate_glb(mesh_path).map_err(StageError::processing)?;
                if mesh_path != result {
                    fs::copy(mesh_path, &result).map_err(|e| StageError::io("copy asset", e))?;
                }
            }
            _ => {
                let mesh = obj::read_mesh(mesh_path).map_err(StageError::processing)?;
                glb::write_glb(&mesh, &result).map_err(StageError::output)?;
            }
        }

        ctx.logger
            .info(&format!("Result written to {}", result.display()));
        artifacts.result_path = Some(result);
        Ok(StageOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, artifacts: &Artifacts) -> StageResult<()> {
        let info = glb::validate_glb(artifacts.result_path()?).map_err(StageError::output)?;
        if info.mesh_count == 0 {
            return Err(StageError::invalid_output("result asset holds no mesh"));
        }
        Ok(())
    }
}
