//! Volumetric image data.

use ndarray::Array3;

/// A 3-D scalar volume.
///
/// Axes are `(x, y, z)` with `z` the slice axis. Values are either
/// intensities (after normalisation) or integer labels stored as `f32`
/// (after segmentation).
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub data: Array3<f32>,
    /// Physical voxel size in millimetres along each axis.
    pub spacing: [f32; 3],
}

impl Volume {
    /// Create a volume with unit spacing.
    pub fn new(data: Array3<f32>) -> Self {
        Self {
            data,
            spacing: [1.0, 1.0, 1.0],
        }
    }

    /// Set the voxel spacing.
    pub fn with_spacing(mut self, spacing: [f32; 3]) -> Self {
        self.spacing = spacing;
        self
    }

    /// Dimensions as `[x, y, z]`.
    pub fn shape(&self) -> [usize; 3] {
        let (x, y, z) = self.data.dim();
        [x, y, z]
    }

    /// Number of slices along the z axis.
    pub fn depth(&self) -> usize {
        self.data.dim().2
    }

    /// Whether the volume holds no voxels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Minimum and maximum voxel value, or `None` for an empty volume.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        let mut iter = self.data.iter().copied();
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}
