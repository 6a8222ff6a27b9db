//! Per-pipeline metadata and organ parameters.

use serde::{Deserialize, Serialize};

/// Static facts about a pipeline, used for help text and input validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDescriptor {
    pub plid: String,
    pub description: String,
    /// Accepted input file types (e.g. `dcm`, `nii`, `glb`).
    pub file_types: Vec<String>,
    /// Imaging modalities the input must contain.
    pub req_modalities: Vec<String>,
    /// Segmentation label vocabulary; the index is the label value.
    pub seg_types: Vec<String>,
}

impl PipelineDescriptor {
    pub fn new(plid: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            plid: plid.into(),
            description: description.into(),
            file_types: Vec::new(),
            req_modalities: Vec::new(),
            seg_types: Vec::new(),
        }
    }

    pub fn with_file_types(mut self, types: &[&str]) -> Self {
        self.file_types = types.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_modalities(mut self, modalities: &[&str]) -> Self {
        self.req_modalities = modalities.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_seg_types(mut self, seg_types: &[&str]) -> Self {
        self.seg_types = seg_types.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Segmentation vocabulary formatted for help text: `0: background, 1: lung`.
    pub fn proc_seg_types(&self) -> String {
        self.seg_types
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{}: {}", i, name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Descriptor plus the numeric parameters the shared stages need.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganConfig {
    pub descriptor: PipelineDescriptor,
    /// Voxels with a label above this value form the surface.
    pub mesh_threshold: f32,
    /// Integer in-plane downscale factor applied during preprocessing.
    pub downscale_factor: usize,
    /// Slice count above which the volume is centrally cropped.
    pub max_depth: Option<usize>,
    /// Labels meshed when the caller selects none.
    pub default_seg_types: Vec<usize>,
}

impl OrganConfig {
    pub fn new(descriptor: PipelineDescriptor) -> Self {
        Self {
            descriptor,
            mesh_threshold: 0.0,
            downscale_factor: 1,
            max_depth: None,
            default_seg_types: Vec::new(),
        }
    }

    pub fn with_mesh_threshold(mut self, threshold: f32) -> Self {
        self.mesh_threshold = threshold;
        self
    }

    pub fn with_downscale(mut self, factor: usize, max_depth: Option<usize>) -> Self {
        self.downscale_factor = factor.max(1);
        self.max_depth = max_depth;
        self
    }

    pub fn with_default_seg_types(mut self, seg_types: &[usize]) -> Self {
        self.default_seg_types = seg_types.to_vec();
        self
    }

    pub fn plid(&self) -> &str {
        &self.descriptor.plid
    }

    /// Check a segmentation-type selection against the vocabulary range.
    pub fn validate_seg_types(&self, selection: &[usize]) -> Result<(), String> {
        let count = self.descriptor.seg_types.len();
        match selection.iter().find(|&&t| t >= count) {
            Some(bad) if count == 0 => Err(format!(
                "pipeline '{}' takes no segmentation types (got {})",
                self.plid(),
                bad
            )),
            Some(bad) => Err(format!(
                "segmentation type {} out of range 0..{} for '{}'",
                bad,
                count,
                self.plid()
            )),
            None => Ok(()),
        }
    }

    /// The caller's selection, or the organ default when empty.
    pub fn effective_seg_types(&self, selection: &[usize]) -> Vec<usize> {
        if selection.is_empty() {
            self.default_seg_types.clone()
        } else {
            selection.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kidney() -> OrganConfig {
        OrganConfig::new(
            PipelineDescriptor::new("kidney_segmentation", "Kidneys")
                .with_seg_types(&["background", "kidney", "tumor"]),
        )
        .with_default_seg_types(&[1, 2])
    }

    #[test]
    fn proc_seg_types_lists_labels() {
        assert_eq!(
            kidney().descriptor.proc_seg_types(),
            "0: background, 1: kidney, 2: tumor"
        );
    }

    #[test]
    fn validates_selection_range() {
        let config = kidney();
        assert!(config.validate_seg_types(&[0, 2]).is_ok());
        assert!(config.validate_seg_types(&[3]).is_err());
    }

    #[test]
    fn empty_selection_uses_default() {
        let config = kidney();
        assert_eq!(config.effective_seg_types(&[]), vec![1, 2]);
        assert_eq!(config.effective_seg_types(&[2]), vec![2]);
    }

    #[test]
    fn downscale_factor_is_at_least_one() {
        let config = kidney().with_downscale(0, Some(10));
        assert_eq!(config.downscale_factor, 1);
        assert_eq!(config.max_depth, Some(10));
    }
}
