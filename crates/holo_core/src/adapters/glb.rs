//! Binary glTF 2.0 (`.glb`) assets, the final output of every pipeline.
//!
//! Container layout:
//! - 12-byte header: magic `glTF`, version 2, total length
//! - JSON chunk describing one mesh with POSITION/NORMAL attributes and a
//!   u32 index buffer
//! - BIN chunk holding positions, normals and indices back to back
//!
//! Both chunks are padded to 4-byte boundaries (JSON with spaces, BIN with
//! zeros).

use std::fs;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use serde_json::{json, Value};

use super::error::{AdapterError, AdapterResult};
use crate::models::Mesh;

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;
const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

const COMPONENT_FLOAT: u32 = 5126;
const COMPONENT_UNSIGNED_INT: u32 = 5125;
const TARGET_ARRAY_BUFFER: u32 = 34962;
const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;
const MODE_TRIANGLES: u32 = 4;

/// Summary of a validated asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlbInfo {
    pub byte_length: u64,
    pub mesh_count: usize,
}

/// Write `mesh` as a self-contained GLB file.
pub fn write_glb(mesh: &Mesh, path: &Path) -> AdapterResult<()> {
    if mesh.is_empty() {
        return Err(AdapterError::EmptyMesh);
    }
    mesh.validate().map_err(AdapterError::InvalidData)?;

    let bin = encode_buffer(mesh);
    let json = document(mesh, bin.len()).to_string();

    let mut json_bytes = json.into_bytes();
    pad(&mut json_bytes, b' ');
    let mut bin_bytes = bin;
    pad(&mut bin_bytes, 0);

    let total = HEADER_LEN + CHUNK_HEADER_LEN * 2 + json_bytes.len() + bin_bytes.len();
    let total_u32 = u32::try_from(total)
        .map_err(|_| AdapterError::invalid_data("mesh exceeds the 4 GiB GLB limit"))?;

    let mut out = Vec::with_capacity(total);
    let io_err = |e| AdapterError::io("encode GLB", e);
    out.write_u32::<LittleEndian>(GLB_MAGIC).map_err(io_err)?;
    out.write_u32::<LittleEndian>(GLB_VERSION).map_err(io_err)?;
    out.write_u32::<LittleEndian>(total_u32).map_err(io_err)?;

    out.write_u32::<LittleEndian>(json_bytes.len() as u32).map_err(io_err)?;
    out.write_u32::<LittleEndian>(CHUNK_JSON).map_err(io_err)?;
    out.extend_from_slice(&json_bytes);

    out.write_u32::<LittleEndian>(bin_bytes.len() as u32).map_err(io_err)?;
    out.write_u32::<LittleEndian>(CHUNK_BIN).map_err(io_err)?;
    out.extend_from_slice(&bin_bytes);

    fs::write(path, out).map_err(|e| AdapterError::io("write GLB", e))
}

/// Check the container structure and JSON chunk of a GLB file.
pub fn validate_glb(path: &Path) -> AdapterResult<GlbInfo> {
    if !path.exists() {
        return Err(AdapterError::FileNotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(|e| AdapterError::io("read GLB", e))?;
    let invalid = |what: &str| AdapterError::invalid_data(format!("{}: {}", path.display(), what));

    if bytes.len() < HEADER_LEN + CHUNK_HEADER_LEN {
        return Err(invalid("too short for a GLB container"));
    }
    if LittleEndian::read_u32(&bytes[0..4]) != GLB_MAGIC {
        return Err(invalid("missing glTF magic"));
    }
    let version = LittleEndian::read_u32(&bytes[4..8]);
    if version != GLB_VERSION {
        return Err(invalid(&format!("unsupported glTF version {}", version)));
    }
    let declared = LittleEndian::read_u32(&bytes[8..12]) as usize;
    if declared != bytes.len() {
        return Err(invalid(&format!(
            "declared length {} but file has {} bytes",
            declared,
            bytes.len()
        )));
    }

    let json_len = LittleEndian::read_u32(&bytes[12..16]) as usize;
    let chunk_type = LittleEndian::read_u32(&bytes[16..20]);
    let json_start = HEADER_LEN + CHUNK_HEADER_LEN;
    if chunk_type != CHUNK_JSON || json_start + json_len > bytes.len() {
        return Err(invalid("first chunk is not a complete JSON chunk"));
    }

    let doc: Value = serde_json::from_slice(&bytes[json_start..json_start + json_len])
        .map_err(|e| invalid(&format!("malformed JSON chunk: {}", e)))?;
    if doc["asset"]["version"] != "2.0" {
        return Err(invalid("asset.version is not 2.0"));
    }

    Ok(GlbInfo {
        byte_length: bytes.len() as u64,
        mesh_count: doc["meshes"].as_array().map_or(0, |m| m.len()),
    })
}

fn encode_buffer(mesh: &Mesh) -> Vec<u8> {
    let floats = (mesh.positions.len() + mesh.normals.len()) * 3;
    let mut bin = vec![0u8; floats * 4 + mesh.indices.len() * 4];
    let mut offset = 0;

    for v in mesh.positions.iter().chain(mesh.normals.iter()) {
        LittleEndian::write_f32_into(v, &mut bin[offset..offset + 12]);
        offset += 12;
    }
    LittleEndian::write_u32_into(&mesh.indices, &mut bin[offset..]);
    bin
}

fn document(mesh: &Mesh, buffer_len: usize) -> Value {
    let vertex_count = mesh.positions.len();
    let vec3_bytes = vertex_count * 12;
    let (min, max) = mesh.bounds().unwrap_or(([0.0; 3], [0.0; 3]));

    let mut attributes = json!({ "POSITION": 0 });
    let mut buffer_views = vec![json!({
        "buffer": 0,
        "byteOffset": 0,
        "byteLength": vec3_bytes,
        "target": TARGET_ARRAY_BUFFER,
    })];
    let mut accessors = vec![json!({
        "bufferView": 0,
        "componentType": COMPONENT_FLOAT,
        "count": vertex_count,
        "type": "VEC3",
        "min": min,
        "max": max,
    })];

    let mut offset = vec3_bytes;
    if !mesh.normals.is_empty() {
        attributes["NORMAL"] = json!(accessors.len());
        buffer_views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": vec3_bytes,
            "target": TARGET_ARRAY_BUFFER,
        }));
        accessors.push(json!({
            "bufferView": buffer_views.len() - 1,
            "componentType": COMPONENT_FLOAT,
            "count": vertex_count,
            "type": "VEC3",
        }));
        offset += vec3_bytes;
    }

    let index_accessor = accessors.len();
    buffer_views.push(json!({
        "buffer": 0,
        "byteOffset": offset,
        "byteLength": mesh.indices.len() * 4,
        "target": TARGET_ELEMENT_ARRAY_BUFFER,
    }));
    accessors.push(json!({
        "bufferView": buffer_views.len() - 1,
        "componentType": COMPONENT_UNSIGNED_INT,
        "count": mesh.indices.len(),
        "type": "SCALAR",
    }));

    json!({
        "asset": { "version": "2.0", "generator": "holo_core" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": attributes,
                "indices": index_accessor,
                "mode": MODE_TRIANGLES,
            }]
        }],
        "buffers": [{ "byteLength": buffer_len }],
        "bufferViews": buffer_views,
        "accessors": accessors,
    })
}

fn pad(bytes: &mut Vec<u8>, fill: u8) {
    while bytes.len() % 4 != 0 {
        bytes.push(fill);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn triangle() -> Mesh {
        Mesh {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn written_asset_validates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.glb");
        write_glb(&triangle(), &path).unwrap();

        let info = validate_glb(&path).unwrap();
        assert_eq!(info.mesh_count, 1);
        assert_eq!(info.byte_length % 4, 0);
        assert_eq!(info.byte_length, fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn json_chunk_describes_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.glb");
        write_glb(&triangle(), &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        let json_len = LittleEndian::read_u32(&bytes[12..16]) as usize;
        let doc: Value = serde_json::from_slice(&bytes[20..20 + json_len]).unwrap();

        assert_eq!(doc["buffers"][0]["byteLength"], 3 * 12 * 2 + 3 * 4);
        assert_eq!(doc["accessors"][0]["max"], json!([1.0, 1.0, 0.0]));
        assert_eq!(doc["meshes"][0]["primitives"][0]["indices"], 2);
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let dir = tempdir().unwrap();
        let err = write_glb(&Mesh::default(), &dir.path().join("x.glb")).unwrap_err();
        assert!(matches!(err, AdapterError::EmptyMesh));
    }

    #[test]
    fn validation_catches_truncation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.glb");
        write_glb(&triangle(), &path).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 4);
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            validate_glb(&path),
            Err(AdapterError::InvalidData(_))
        ));
    }
}
