//! NIfTI-1 single-file volumes (`.nii`, `.nii.gz`).
//!
//! Reading accepts either byte order and the common scalar datatypes.
//! 4-D files yield their first 3-D frame. Writing always produces a
//! little-endian float32 volume, which is what the intermediate files
//! handed to segmentation tools use.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array3, ShapeBuilder};

use super::error::{AdapterError, AdapterResult};
use crate::models::Volume;

const HEADER_SIZE: usize = 348;
/// Header plus the 4-byte extension flag.
const DATA_OFFSET: usize = 352;
const MAGIC_SINGLE_FILE: &[u8; 4] = b"n+1\0";
const MAGIC_PAIR: &[u8; 4] = b"ni1\0";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const DT_UINT8: i16 = 2;
const DT_INT16: i16 = 4;
const DT_INT32: i16 = 8;
const DT_FLOAT32: i16 = 16;
const DT_FLOAT64: i16 = 64;
const DT_INT8: i16 = 256;
const DT_UINT16: i16 = 512;

/// Whether `path` names a NIfTI file by extension.
pub fn is_nifti_path(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.ends_with(".nii") || name.ends_with(".nii.gz")
}

/// Read a volume; `normalise` applies the header's `scl_slope`/`scl_inter`.
pub fn read_volume(path: &Path, normalise: bool) -> AdapterResult<Volume> {
    if !path.exists() {
        return Err(AdapterError::FileNotFound(path.to_path_buf()));
    }

    let raw = fs::read(path).map_err(|e| AdapterError::io("read NIfTI file", e))?;
    let bytes = if raw.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        GzDecoder::new(&raw[..])
            .read_to_end(&mut out)
            .map_err(|e| AdapterError::invalid_data(format!("corrupt gzip stream: {}", e)))?;
        out
    } else {
        raw
    };

    parse(&bytes, normalise).map_err(|e| match e {
        AdapterError::InvalidData(msg) => {
            AdapterError::InvalidData(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Write `volume` as little-endian float32; a `.gz` suffix compresses.
pub fn write_volume(volume: &Volume, path: &Path) -> AdapterResult<()> {
    let [nx, ny, nz] = volume.shape();
    let to_dim = |n: usize| {
        i16::try_from(n).map_err(|_| {
            AdapterError::invalid_data(format!("dimension {} exceeds the NIfTI-1 limit", n))
        })
    };
    let dims = [to_dim(nx)?, to_dim(ny)?, to_dim(nz)?];

    let mut bytes = vec![0u8; DATA_OFFSET + volume.data.len() * 4];
    {
        let header = &mut bytes[..DATA_OFFSET];
        LittleEndian::write_i32(&mut header[0..4], HEADER_SIZE as i32);
        let dim = [3, dims[0], dims[1], dims[2], 1, 1, 1, 1];
        for (i, d) in dim.iter().enumerate() {
            LittleEndian::write_i16(&mut header[40 + 2 * i..], *d);
        }
        LittleEndian::write_i16(&mut header[70..72], DT_FLOAT32);
        LittleEndian::write_i16(&mut header[72..74], 32);
        let pixdim = [
            1.0,
            volume.spacing[0],
            volume.spacing[1],
            volume.spacing[2],
            0.0,
            0.0,
            0.0,
            0.0,
        ];
        for (i, p) in pixdim.iter().enumerate() {
            LittleEndian::write_f32(&mut header[76 + 4 * i..], *p);
        }
        LittleEndian::write_f32(&mut header[108..112], DATA_OFFSET as f32);
        LittleEndian::write_f32(&mut header[112..116], 1.0);
        LittleEndian::write_f32(&mut header[116..120], 0.0);
        // Spatial units: millimetres.
        header[123] = 2;
        let descrip = b"holo_core";
        header[148..148 + descrip.len()].copy_from_slice(descrip);
        header[344..348].copy_from_slice(MAGIC_SINGLE_FILE);
    }

    // NIfTI stores x fastest.
    let mut offset = DATA_OFFSET;
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                LittleEndian::write_f32(&mut bytes[offset..offset + 4], volume.data[[x, y, z]]);
                offset += 4;
            }
        }
    }

    let compress = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    let out = if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder
            .write_all(&bytes)
            .map_err(|e| AdapterError::io("compress NIfTI file", e))?;
        encoder
            .finish()
            .map_err(|e| AdapterError::io("compress NIfTI file", e))?
    } else {
        bytes
    };

    fs::write(path, out).map_err(|e| AdapterError::io("write NIfTI file", e))
}

fn parse(bytes: &[u8], normalise: bool) -> AdapterResult<Volume> {
    if bytes.len() < HEADER_SIZE {
        return Err(AdapterError::invalid_data(format!(
            "{} bytes is shorter than a NIfTI-1 header",
            bytes.len()
        )));
    }

    if LittleEndian::read_i32(&bytes[0..4]) == HEADER_SIZE as i32 {
        decode::<LittleEndian>(bytes, normalise)
    } else if BigEndian::read_i32(&bytes[0..4]) == HEADER_SIZE as i32 {
        decode::<BigEndian>(bytes, normalise)
    } else {
        Err(AdapterError::UnsupportedFormat(
            "not a NIfTI-1 file (bad header size)".to_string(),
        ))
    }
}

fn decode<B: ByteOrder>(bytes: &[u8], normalise: bool) -> AdapterResult<Volume> {
    let magic = &bytes[344..348];
    if magic == MAGIC_PAIR {
        return Err(AdapterError::UnsupportedFormat(
            "NIfTI header/image pairs (.hdr/.img) are not supported".to_string(),
        ));
    }
    if magic != MAGIC_SINGLE_FILE {
        return Err(AdapterError::UnsupportedFormat(
            "missing NIfTI-1 magic".to_string(),
        ));
    }

    let dim = |i: usize| B::read_i16(&bytes[40 + 2 * i..]);
    let ndim = dim(0);
    if !(1..=7).contains(&ndim) {
        return Err(AdapterError::invalid_data(format!(
            "dimension count {} out of range",
            ndim
        )));
    }
    let extent = |i: usize| -> AdapterResult<usize> {
        if (i as i16) > ndim {
            return Ok(1);
        }
        let n = dim(i);
        if n <= 0 {
            return Err(AdapterError::invalid_data(format!(
                "non-positive extent {} on axis {}",
                n, i
            )));
        }
        Ok(n as usize)
    };
    let (nx, ny, nz) = (extent(1)?, extent(2)?, extent(3)?);

    let spacing = [1, 2, 3].map(|i| {
        let p = B::read_f32(&bytes[76 + 4 * i..]).abs();
        if p.is_finite() && p > 0.0 {
            p
        } else {
            1.0
        }
    });

    let datatype = B::read_i16(&bytes[70..72]);
    let bytes_per_voxel = match datatype {
        DT_UINT8 | DT_INT8 => 1,
        DT_INT16 | DT_UINT16 => 2,
        DT_INT32 | DT_FLOAT32 => 4,
        DT_FLOAT64 => 8,
        other => {
            return Err(AdapterError::UnsupportedFormat(format!(
                "NIfTI datatype code {}",
                other
            )))
        }
    };

    let vox_offset = B::read_f32(&bytes[108..112]);
    let vox_offset = if vox_offset.is_finite() && vox_offset >= HEADER_SIZE as f32 {
        vox_offset as usize
    } else {
        DATA_OFFSET
    };

    let count = nx * ny * nz;
    let end = vox_offset + count * bytes_per_voxel;
    if bytes.len() < end {
        return Err(AdapterError::invalid_data(format!(
            "truncated image data: need {} bytes, have {}",
            end,
            bytes.len()
        )));
    }
    let data = &bytes[vox_offset..end];

    let mut values: Vec<f32> = match datatype {
        DT_UINT8 => data.iter().map(|&b| b as f32).collect(),
        DT_INT8 => data.iter().map(|&b| b as i8 as f32).collect(),
        DT_INT16 => data.chunks_exact(2).map(|c| B::read_i16(c) as f32).collect(),
        DT_UINT16 => data.chunks_exact(2).map(|c| B::read_u16(c) as f32).collect(),
        DT_INT32 => data.chunks_exact(4).map(|c| B::read_i32(c) as f32).collect(),
        DT_FLOAT32 => data.chunks_exact(4).map(B::read_f32).collect(),
        _ => data.chunks_exact(8).map(|c| B::read_f64(c) as f32).collect(),
    };

    if normalise {
        let slope = B::read_f32(&bytes[112..116]);
        let inter = B::read_f32(&bytes[116..120]);
        // A zero slope means "no scaling" in NIfTI-1.
        if slope != 0.0 && slope.is_finite() && inter.is_finite() {
            for v in &mut values {
                *v = *v * slope + inter;
            }
        }
    }

    let array = Array3::from_shape_vec((nx, ny, nz).f(), values)
        .map_err(|e| AdapterError::invalid_data(e.to_string()))?;
    Ok(Volume::new(array).with_spacing(spacing))
}
