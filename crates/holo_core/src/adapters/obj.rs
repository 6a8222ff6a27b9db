//! Wavefront OBJ, the intermediate mesh format between segmentation and
//! postprocessing, and one of the formats accepted by mesh import.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use super::error::{AdapterError, AdapterResult};
use crate::models::mesh::normalize;
use crate::models::Mesh;

/// Write positions, normals and triangles.
pub fn write_mesh(mesh: &Mesh, path: &Path) -> AdapterResult<()> {
    mesh.validate().map_err(AdapterError::InvalidData)?;

    let io_err = |e| AdapterError::io("write OBJ", e);
    let file = File::create(path).map_err(io_err)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "# holo_core surface").map_err(io_err)?;
    for p in &mesh.positions {
        writeln!(out, "v {} {} {}", p[0], p[1], p[2]).map_err(io_err)?;
    }
    for n in &mesh.normals {
        writeln!(out, "vn {} {} {}", n[0], n[1], n[2]).map_err(io_err)?;
    }

    let with_normals = !mesh.normals.is_empty();
    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] + 1, tri[1] + 1, tri[2] + 1];
        if with_normals {
            writeln!(out, "f {a}//{a} {b}//{b} {c}//{c}").map_err(io_err)?;
        } else {
            writeln!(out, "f {a} {b} {c}").map_err(io_err)?;
        }
    }

    out.flush().map_err(io_err)
}

/// Read an OBJ file into a triangle mesh.
///
/// Polygons are fan-triangulated. Normals are taken from the file when
/// there is exactly one per vertex, otherwise recomputed from the faces.
/// Texture coordinates, groups and materials are ignored.
pub fn read_mesh(path: &Path) -> AdapterResult<Mesh> {
    if !path.exists() {
        return Err(AdapterError::FileNotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|e| AdapterError::io("read OBJ", e))?;

    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut file_normals: Vec<[f32; 3]> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let bad_line = |what: &str| {
            AdapterError::invalid_data(format!(
                "{}:{}: {}",
                path.display(),
                line_no + 1,
                what
            ))
        };

        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => positions.push(parse_vec3(&mut tokens).ok_or_else(|| bad_line("bad vertex"))?),
            Some("vn") => {
                file_normals.push(parse_vec3(&mut tokens).ok_or_else(|| bad_line("bad normal"))?)
            }
            Some("f") => {
                let corners = tokens
                    .map(|t| resolve_index(t, positions.len()))
                    .collect::<Option<Vec<u32>>>()
                    .ok_or_else(|| bad_line("bad face index"))?;
                if corners.len() < 3 {
                    return Err(bad_line("face with fewer than 3 vertices"));
                }
                for i in 1..corners.len() - 1 {
                    indices.extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
                }
            }
            _ => {}
        }
    }

    let normals = if file_normals.len() == positions.len() {
        file_normals.into_iter().map(normalize).collect()
    } else {
        compute_normals(&positions, &indices)
    };

    let mesh = Mesh {
        positions,
        normals,
        indices,
    };
    mesh.validate().map_err(AdapterError::InvalidData)?;
    Ok(mesh)
}

fn parse_vec3<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Option<[f32; 3]> {
    let x = tokens.next()?.parse().ok()?;
    let y = tokens.next()?.parse().ok()?;
    let z = tokens.next()?.parse().ok()?;
    Some([x, y, z])
}

/// Zero-based index from an OBJ face corner (`v`, `v/t`, `v//n`, `v/t/n`).
fn resolve_index(token: &str, vertex_count: usize) -> Option<u32> {
    let raw: i64 = token.split('/').next()?.parse().ok()?;
    let index = match raw {
        0 => return None,
        r if r > 0 => r - 1,
        r => vertex_count as i64 + r,
    };
    if index < 0 || index >= vertex_count as i64 {
        return None;
    }
    u32::try_from(index).ok()
}

/// Area-weighted vertex normals.
fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut sums = vec![[0.0f32; 3]; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let (pa, pb, pc) = (positions[a], positions[b], positions[c]);
        let u = [pb[0] - pa[0], pb[1] - pa[1], pb[2] - pa[2]];
        let v = [pc[0] - pa[0], pc[1] - pa[1], pc[2] - pa[2]];
        let n = [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ];
        for &i in &[a, b, c] {
            for axis in 0..3 {
                sums[i][axis] += n[axis];
            }
        }
    }
    sums.into_iter().map(normalize).collect()
}
