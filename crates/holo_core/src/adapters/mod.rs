//! Adapters for the external collaborators a pipeline drives.
//!
//! Every stage talks to the outside world through one of these traits:
//! - [`InputFetcher`] - retrieve and unpack the study archive
//! - [`VolumeReader`] - load the unpacked study as a [`Volume`]
//! - [`Segmenter`] - turn an intermediate volume into a label volume
//! - [`MeshExtractor`] - turn a label volume into a surface [`Mesh`]
//! - [`Dispatcher`] - deliver the finished asset
//!
//! Each trait ships with a default implementation; tests and embedders can
//! substitute their own.

mod dispatch;
mod error;
mod fetch;
pub mod glb;
mod mesh;
pub mod nifti;
pub mod obj;
pub mod preprocess;
mod reader;
mod segmentation;

use std::path::{Path, PathBuf};

use crate::jobs::MedicalData;
use crate::logging::JobLogger;
use crate::models::{Mesh, Volume};

pub use dispatch::{HttpDispatcher, LocalDispatcher};
pub use error::{AdapterError, AdapterResult};
pub use fetch::ArchiveFetcher;
pub use mesh::SurfaceNetsExtractor;
pub use reader::NiftiDirectoryReader;
pub(crate) use reader::collect_files;
pub use segmentation::{ExternalSegmenter, ThresholdSegmenter, UnconfiguredSegmenter};

/// Mesh file formats the pipelines read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Obj,
    Glb,
}

impl MeshFormat {
    /// Format from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "obj" => Some(Self::Obj),
            "glb" => Some(Self::Glb),
            _ => None,
        }
    }
}

/// Retrieves a job's input and unpacks it into a directory.
pub trait InputFetcher: Send + Sync {
    /// Fetch `endpoint` and unpack it into `dest`, which already exists.
    fn fetch_and_unpack(&self, endpoint: &str, dest: &Path, logger: &JobLogger)
        -> AdapterResult<()>;
}

/// Loads an unpacked study directory.
pub trait VolumeReader: Send + Sync {
    /// Read the study in `input_dir`; `normalise` applies intensity scaling.
    fn read(&self, input_dir: &Path, normalise: bool) -> AdapterResult<Volume>;
}

/// Produces a label volume from an intermediate volume file.
pub trait Segmenter: Send + Sync {
    /// Segment `input` and return the path of the label volume written
    /// under `output_dir`.
    fn segment(&self, input: &Path, output_dir: &Path, logger: &JobLogger)
        -> AdapterResult<PathBuf>;
}

/// Which voxels of a label volume form the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshRequest {
    /// With no label selection, voxels must be strictly above this value.
    pub threshold: f32,
    /// When non-empty, the rounded label must be one of these and the
    /// threshold is not consulted, so background (0) can be selected.
    pub labels: Vec<usize>,
}

impl MeshRequest {
    pub fn new(threshold: f32, labels: Vec<usize>) -> Self {
        Self { threshold, labels }
    }

    /// Whether a voxel value belongs inside the surface.
    pub fn contains(&self, value: f32) -> bool {
        if value.is_nan() {
            return false;
        }
        if self.labels.is_empty() {
            return value > self.threshold;
        }
        let label = value.round();
        label >= 0.0 && self.labels.contains(&(label as usize))
    }
}

/// Builds a surface mesh from a label volume.
pub trait MeshExtractor: Send + Sync {
    fn extract(&self, labels: &Volume, request: &MeshRequest) -> AdapterResult<Mesh>;
}

/// Everything a dispatcher receives for one finished job.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    pub job_id: &'a str,
    pub plid: &'a str,
    /// Forwarded without inspection.
    pub medical_data: &'a MedicalData,
    pub result_path: &'a Path,
}

/// Delivers a finished asset to its consumer.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, request: &DispatchRequest<'_>) -> AdapterResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_format_from_extension() {
        assert_eq!(MeshFormat::from_path(Path::new("a/model.GLB")), Some(MeshFormat::Glb));
        assert_eq!(MeshFormat::from_path(Path::new("temp.obj")), Some(MeshFormat::Obj));
        assert_eq!(MeshFormat::from_path(Path::new("scan.nii")), None);
    }

    #[test]
    fn mesh_request_threshold_only() {
        let request = MeshRequest::new(0.0, Vec::new());
        assert!(request.contains(1.0));
        assert!(request.contains(0.5));
        assert!(!request.contains(0.0));
        assert!(!request.contains(f32::NAN));
    }

    #[test]
    fn mesh_request_label_selection() {
        let request = MeshRequest::new(0.0, vec![2]);
        assert!(request.contains(2.0));
        assert!(!request.contains(1.0));
        assert!(!request.contains(3.0));
    }

    #[test]
    fn mesh_request_background_label_ignores_threshold() {
        let request = MeshRequest::new(0.0, vec![0]);
        assert!(request.contains(0.0));
        assert!(!request.contains(1.0));
        assert!(!request.contains(f32::NAN));
    }
}
