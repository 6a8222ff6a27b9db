//! Surface extraction from label volumes with surface nets.

use fast_surface_nets::ndshape::{RuntimeShape, Shape};
use fast_surface_nets::{surface_nets, SurfaceNetsBuffer};

use super::error::{AdapterError, AdapterResult};
use super::{MeshExtractor, MeshRequest};
use crate::models::mesh::normalize;
use crate::models::{Mesh, Volume};

const INSIDE: f32 = -1.0;
const OUTSIDE: f32 = 1.0;

/// Default [`MeshExtractor`].
///
/// Selected voxels become a binary field padded by one outside voxel on
/// every side, so surfaces touching the volume border are closed.
/// Vertices are returned in millimetres using the volume spacing.
#[derive(Debug, Clone, Default)]
pub struct SurfaceNetsExtractor;

impl SurfaceNetsExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl MeshExtractor for SurfaceNetsExtractor {
    fn extract(&self, labels: &Volume, request: &MeshRequest) -> AdapterResult<Mesh> {
        if labels.is_empty() {
            return Err(AdapterError::EmptyMesh);
        }

        let [nx, ny, nz] = labels.shape();
        let padded = [nx + 2, ny + 2, nz + 2];
        let total = padded[0]
            .checked_mul(padded[1])
            .and_then(|n| n.checked_mul(padded[2]))
            .filter(|&n| n <= u32::MAX as usize)
            .ok_or_else(|| {
                AdapterError::invalid_data(format!(
                    "label volume {}x{}x{} is too large to mesh",
                    nx, ny, nz
                ))
            })?;

        let shape = RuntimeShape::<u32, 3>::new(padded.map(|n| n as u32));
        let mut sdf = vec![OUTSIDE; total];
        let mut inside = 0usize;
        for (i, value) in sdf.iter_mut().enumerate() {
            let [px, py, pz] = shape.delinearize(i as u32).map(|c| c as usize);
            let interior = (1..=nx).contains(&px) && (1..=ny).contains(&py) && (1..=nz).contains(&pz);
            if interior && request.contains(labels.data[[px - 1, py - 1, pz - 1]]) {
                *value = INSIDE;
                inside += 1;
            }
        }

        if inside == 0 {
            return Err(AdapterError::EmptyMesh);
        }

        let mut buffer = SurfaceNetsBuffer::default();
        let max = padded.map(|n| n as u32 - 1);
        surface_nets(&sdf, &shape, [0; 3], max, &mut buffer);

        if buffer.indices.is_empty() {
            return Err(AdapterError::EmptyMesh);
        }

        let spacing = labels.spacing;
        let positions = buffer
            .positions
            .iter()
            .map(|p| {
                [
                    (p[0] - 1.0) * spacing[0],
                    (p[1] - 1.0) * spacing[1],
                    (p[2] - 1.0) * spacing[2],
                ]
            })
            .collect();
        let normals = buffer
            .normals
            .iter()
            .map(|n| normalize([n[0] / spacing[0], n[1] / spacing[1], n[2] / spacing[2]]))
            .collect();

        let mesh = Mesh {
            positions,
            normals,
            indices: buffer.indices,
        };
        tracing::debug!(
            "Extracted {} vertices, {} faces from {} voxels",
            mesh.positions.len(),
            mesh.face_count(),
            inside
        );
        Ok(mesh)
    }
}
