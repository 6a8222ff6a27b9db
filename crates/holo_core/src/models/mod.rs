//! Data models shared by adapters, stages and pipelines.
//!
//! - `Volume`: in-memory volumetric representation
//! - `Mesh`: extracted surface (vertices, normals, triangles)
//! - `PipelineDescriptor` / `OrganConfig`: per-plid static facts and parameters

mod descriptor;
pub(crate) mod mesh;
mod volume;

pub use descriptor::{OrganConfig, PipelineDescriptor};
pub use mesh::Mesh;
pub use volume::Volume;
