//! Error type shared by the stage adapters.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error from an adapter call.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// A required file or directory does not exist.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Remote input could not be retrieved.
    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    /// The receiving service refused the asset.
    #[error("Upload to {url} rejected: {message}")]
    Upload { url: String, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Archive is corrupt or of an unknown kind.
    #[error("Failed to unpack {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },

    /// Input is of a type this adapter does not read.
    #[error("Unsupported input: {0}")]
    UnsupportedFormat(String),

    /// Data read successfully but violates shape or range assumptions.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// An external tool exited unsuccessfully.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    ToolFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// A tool or writer finished without producing its output.
    #[error("Expected output missing: {}", .0.display())]
    OutputMissing(PathBuf),

    /// Mesh extraction found no surface at the requested threshold.
    #[error("Mesh extraction produced an empty surface")]
    EmptyMesh,

    /// The adapter needed for this pipeline is not configured.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl AdapterError {
    /// Create an I/O error with context.
    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_displays_context() {
        let err = AdapterError::ToolFailed {
            tool: "lungmask".to_string(),
            exit_code: 3,
            message: "CUDA out of memory".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("lungmask"));
        assert!(msg.contains("exit code 3"));
    }

    #[test]
    fn io_error_names_operation() {
        let err = AdapterError::io("write OBJ", io::Error::other("disk full"));
        assert_eq!(err.to_string(), "I/O error in write OBJ: disk full");
    }
}
