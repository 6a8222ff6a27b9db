//! Deterministic volume reduction ahead of segmentation.

use ndarray::{s, Array3};

use super::error::{AdapterError, AdapterResult};
use crate::models::Volume;

/// Downscale in-plane by `factor`, then crop the slice axis to `max_depth`.
///
/// Each output voxel is the mean of a `factor x factor` block of input
/// voxels on the same slice; trailing rows and columns that do not fill a
/// block are dropped. The slice axis is never resampled. When the depth
/// exceeds `max_depth`, the central `max_depth` slices are kept. The same
/// input always yields the same output.
pub fn downscale_and_conditionally_crop(
    volume: &Volume,
    factor: usize,
    max_depth: Option<usize>,
) -> AdapterResult<Volume> {
    if volume.is_empty() {
        return Err(AdapterError::invalid_data("cannot preprocess an empty volume"));
    }

    let factor = factor.max(1);
    let [nx, ny, nz] = volume.shape();
    if nx < factor || ny < factor {
        return Err(AdapterError::invalid_data(format!(
            "volume {}x{} is smaller than the downscale factor {}",
            nx, ny, factor
        )));
    }

    let mut data = if factor == 1 {
        volume.data.clone()
    } else {
        let block = (factor * factor) as f32;
        Array3::from_shape_fn((nx / factor, ny / factor, nz), |(x, y, z)| {
            let x0 = x * factor;
            let y0 = y * factor;
            volume
                .data
                .slice(s![x0..x0 + factor, y0..y0 + factor, z])
                .sum()
                / block
        })
    };

    if let Some(max) = max_depth.filter(|&m| m > 0) {
        if nz > max {
            let start = (nz - max) / 2;
            tracing::debug!(
                "Cropping depth {} to slices {}..{}",
                nz,
                start,
                start + max
            );
            data = data.slice(s![.., .., start..start + max]).to_owned();
        }
    }

    let spacing = [
        volume.spacing[0] * factor as f32,
        volume.spacing[1] * factor as f32,
        volume.spacing[2],
    ];
    Ok(Volume::new(data).with_spacing(spacing))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(nx: usize, ny: usize, nz: usize) -> Volume {
        Volume::new(Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| {
            (x + y * nx + z * 1000) as f32
        }))
    }

    #[test]
    fn block_mean_halves_in_plane() {
        let volume = ramp(4, 4, 3).with_spacing([0.5, 0.5, 2.0]);
        let out = downscale_and_conditionally_crop(&volume, 2, None).unwrap();

        assert_eq!(out.shape(), [2, 2, 3]);
        // Block (0..2, 0..2) on slice 0 holds 0, 1, 4, 5.
        assert_eq!(out.data[[0, 0, 0]], 2.5);
        assert_eq!(out.data[[1, 1, 2]], 2000.0 + 12.5);
        assert_eq!(out.spacing, [1.0, 1.0, 2.0]);
    }

    #[test]
    fn odd_extent_drops_remainder() {
        let out = downscale_and_conditionally_crop(&ramp(5, 3, 1), 2, None).unwrap();
        assert_eq!(out.shape(), [2, 1, 1]);
    }

    #[test]
    fn deep_volume_is_cropped_centrally() {
        let out = downscale_and_conditionally_crop(&ramp(2, 2, 10), 1, Some(4)).unwrap();
        assert_eq!(out.depth(), 4);
        assert_eq!(out.data[[0, 0, 0]], 3000.0);
        assert_eq!(out.data[[0, 0, 3]], 6000.0);
    }

    #[test]
    fn shallow_volume_is_untouched() {
        let volume = ramp(2, 2, 3);
        let out = downscale_and_conditionally_crop(&volume, 1, Some(256)).unwrap();
        assert_eq!(out, volume);
    }

    #[test]
    fn output_is_deterministic() {
        let volume = ramp(6, 6, 9);
        let a = downscale_and_conditionally_crop(&volume, 3, Some(5)).unwrap();
        let b = downscale_and_conditionally_crop(&volume, 3, Some(5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(downscale_and_conditionally_crop(&ramp(1, 4, 1), 2, None).is_err());
        let empty = Volume::new(Array3::zeros((0, 0, 0)));
        assert!(downscale_and_conditionally_crop(&empty, 1, None).is_err());
    }
}
