//! Result delivery.
//!
//! - [`LocalDispatcher`] files the asset and a metadata sidecar under an
//!   output folder, one subdirectory per plid
//! - [`HttpDispatcher`] uploads the asset and metadata to a storage
//!   service as a multipart form

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use serde_json::json;

use super::error::{AdapterError, AdapterResult};
use super::{DispatchRequest, Dispatcher};

const GLB_MIME: &str = "model/gltf-binary";
const CREATION_MODE: &str = "GENERATE_FROM_IMAGING_STUDY";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Copies finished assets into `<output_folder>/<plid>/`.
#[derive(Debug, Clone)]
pub struct LocalDispatcher {
    output_folder: PathBuf,
}

impl LocalDispatcher {
    pub fn new(output_folder: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
        }
    }

    /// Where the asset for `job_id` lands.
    pub fn asset_path(&self, plid: &str, job_id: &str) -> PathBuf {
        self.output_folder.join(plid).join(format!("{}.glb", job_id))
    }
}

impl Dispatcher for LocalDispatcher {
    fn dispatch(&self, request: &DispatchRequest<'_>) -> AdapterResult<()> {
        if !request.result_path.is_file() {
            return Err(AdapterError::FileNotFound(request.result_path.to_path_buf()));
        }

        let target = self.asset_path(request.plid, request.job_id);
        let target_dir = target.parent().unwrap_or(&self.output_folder);
        fs::create_dir_all(target_dir).map_err(|e| AdapterError::io("create output folder", e))?;

        let sidecar = json!({
            "job_id": request.job_id,
            "plid": request.plid,
            "medical_data": request.medical_data,
            "asset": target.file_name().map(|n| n.to_string_lossy().into_owned()),
        });
        let sidecar_bytes = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| AdapterError::invalid_data(e.to_string()))?;

        let temp = target.with_extension("glb.tmp");
        fs::copy(request.result_path, &temp).map_err(|e| AdapterError::io("copy asset", e))?;
        fs::rename(&temp, &target).map_err(|e| AdapterError::io("copy asset", e))?;
        write_atomic(&target.with_extension("json"), &sidecar_bytes)?;

        tracing::info!("Dispatched {} to {}", request.job_id, target.display());
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> AdapterResult<()> {
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, bytes).map_err(|e| AdapterError::io("write sidecar", e))?;
    fs::rename(&temp, path).map_err(|e| AdapterError::io("write sidecar", e))
}

/// Uploads finished assets to `<base_url>/holograms`.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    base_url: String,
    timeout: Duration,
}

impl HttpDispatcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn upload_url(&self) -> String {
        format!("{}/holograms", self.base_url.trim_end_matches('/'))
    }
}

impl Dispatcher for HttpDispatcher {
    fn dispatch(&self, request: &DispatchRequest<'_>) -> AdapterResult<()> {
        if !request.result_path.is_file() {
            return Err(AdapterError::FileNotFound(request.result_path.to_path_buf()));
        }

        let medical_data = serde_json::to_string(request.medical_data)
            .map_err(|e| AdapterError::invalid_data(e.to_string()))?;
        let asset = Part::file(request.result_path)
            .map_err(|e| AdapterError::io("open asset", e))?
            .file_name(format!("{}.glb", request.job_id))
            .mime_str(GLB_MIME)?;

        let form = Form::new()
            .text("jobId", request.job_id.to_string())
            .text("plid", request.plid.to_string())
            .text("creationMode", CREATION_MODE)
            .text("medicalData", medical_data)
            .part("hologramFile", asset);

        let url = self.upload_url();
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let response = client.post(&url).multipart(form).send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AdapterError::Upload {
                url,
                message: format!("HTTP {} {}", status, body.trim()),
            });
        }

        tracing::info!("Uploaded {} to {}", request.job_id, url);
        Ok(())
    }
}
