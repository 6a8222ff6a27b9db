//! Default [`VolumeReader`]: the first NIfTI volume in the unpacked study.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use super::error::{AdapterError, AdapterResult};
use super::nifti;
use super::VolumeReader;
use crate::models::Volume;

/// Reads `.nii`/`.nii.gz` studies from a directory tree.
///
/// Files are visited in sorted path order so the choice is stable across
/// runs. DICOM series are recognised and rejected with a clear message;
/// a DICOM-capable reader plugs in through the same trait.
#[derive(Debug, Clone, Default)]
pub struct NiftiDirectoryReader;

impl NiftiDirectoryReader {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeReader for NiftiDirectoryReader {
    fn read(&self, input_dir: &Path, normalise: bool) -> AdapterResult<Volume> {
        if !input_dir.is_dir() {
            return Err(AdapterError::FileNotFound(input_dir.to_path_buf()));
        }

        let files = collect_files(input_dir)?;
        if let Some(path) = files.iter().find(|p| nifti::is_nifti_path(p)) {
            tracing::debug!("Reading volume {}", path.display());
            let volume = nifti::read_volume(path, normalise)?;
            if volume.is_empty() {
                return Err(AdapterError::invalid_data(format!(
                    "{} holds no voxels",
                    path.display()
                )));
            }
            return Ok(volume);
        }

        let dicom_count = files.iter().filter(|p| is_dicom(p)).count();
        if dicom_count > 0 {
            return Err(AdapterError::UnsupportedFormat(format!(
                "{} DICOM files found in {}; configure a DICOM reader",
                dicom_count,
                input_dir.display()
            )));
        }

        Err(AdapterError::UnsupportedFormat(format!(
            "no NIfTI volume found in {}",
            input_dir.display()
        )))
    }
}

pub(crate) fn collect_files(dir: &Path) -> AdapterResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries =
            fs::read_dir(&current).map_err(|e| AdapterError::io("read input directory", e))?;
        for entry in entries {
            let path = entry
                .map_err(|e| AdapterError::io("read input directory", e))?
                .path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// `.dcm` extension, or the `DICM` preamble marker at byte 128.
fn is_dicom(path: &Path) -> bool {
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
    {
        return true;
    }
    let mut preamble = [0u8; 132];
    fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut preamble))
        .map(|_| &preamble[128..] == b"DICM")
        .unwrap_or(false)
}
