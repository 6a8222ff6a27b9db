//! Organ pipelines and the plid registry.
//!
//! This module provides:
//! - `OrganPipeline`: the entry-point contract every pipeline implements
//! - `StagedPipeline`: the shared implementation, an `OrganConfig` plus a stage list
//! - `organs`: built-in configurations and stage-list builders
//! - `PipelineController`: plid → pipeline registry with metadata lookups

mod controller;
pub mod organs;
mod staged;

pub use controller::{ControllerError, ControllerResult, PipelineController};
pub use organs::StageAdapters;
pub use staged::{PipelineEnv, StagedPipeline};

use std::path::Path;

use crate::jobs::MedicalData;
use crate::models::PipelineDescriptor;
use crate::orchestrator::{PipelineResult, PipelineRunResult};

/// A pipeline callers can resolve by plid.
pub trait OrganPipeline: Send + Sync {
    /// Static metadata for help text and input validation.
    fn descriptor(&self) -> &PipelineDescriptor;

    /// Job-oriented run: fetch, process, dispatch, tracking state throughout.
    ///
    /// Returns the first stage failure; the job's recorded state is left at
    /// the stage that failed.
    fn run(
        &self,
        job_id: &str,
        input_endpoint: &str,
        medical_data: &MedicalData,
    ) -> PipelineResult<PipelineRunResult>;

    /// File-oriented run without job tracking: read `input`, write the
    /// asset to `output`. `options` selects segmentation types.
    fn run_file(
        &self,
        input: &Path,
        output: &Path,
        options: &[usize],
    ) -> PipelineResult<PipelineRunResult>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs::File;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use ndarray::Array3;
    use parking_lot::Mutex;

    use crate::adapters::{nifti, AdapterResult, DispatchRequest, Dispatcher};
    use crate::jobs::MedicalData;
    use crate::models::Volume;

    /// CT-like volume: a 300 HU sphere in -1000 HU air.
    pub fn sphere_volume() -> Volume {
        let n = 24;
        let c = (n as f32 - 1.0) / 2.0;
        let data = Array3::from_shape_fn((n, n, n), |(x, y, z)| {
            let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2) + (z as f32 - c).powi(2))
                .sqrt();
            if d < 8.0 {
                400.0
            } else {
                -1000.0
            }
        });
        Volume::new(data).with_spacing([0.8, 0.8, 1.5])
    }

    /// Directory holding the sphere study as a NIfTI file.
    pub fn sphere_study_dir(dir: &Path) -> PathBuf {
        let study = dir.join("study");
        std::fs::create_dir_all(&study).unwrap();
        nifti::write_volume(&sphere_volume(), &study.join("ct.nii")).unwrap();
        study
    }

    /// Zip archive holding the sphere study.
    pub fn sphere_study_zip(dir: &Path) -> PathBuf {
        let nii = dir.join("ct-source.nii");
        nifti::write_volume(&sphere_volume(), &nii).unwrap();

        let path = dir.join("study.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("series/ct.nii", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(&std::fs::read(&nii).unwrap()).unwrap();
        zip.finish().unwrap();
        std::fs::remove_file(&nii).unwrap();
        path
    }

    /// One dispatch call as seen by [`RecordingDispatcher`].
    #[derive(Debug, Clone, PartialEq)]
    pub struct DispatchCall {
        pub job_id: String,
        pub plid: String,
        pub medical_data: MedicalData,
        pub result_path: PathBuf,
    }

    #[derive(Debug, Default)]
    pub struct RecordingDispatcher {
        pub calls: Mutex<Vec<DispatchCall>>,
    }

    impl Dispatcher for RecordingDispatcher {
        fn dispatch(&self, request: &DispatchRequest<'_>) -> AdapterResult<()> {
            self.calls.lock().push(DispatchCall {
                job_id: request.job_id.to_string(),
                plid: request.plid.to_string(),
                medical_data: request.medical_data.clone(),
                result_path: request.result_path.to_path_buf(),
            });
            Ok(())
        }
    }
}
