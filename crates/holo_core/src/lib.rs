//! Holo Core - pipeline execution for turning imaging studies into 3D assets
//!
//! This crate contains the job workspace, the job state store, the stage
//! driver and the organ pipelines, with zero CLI dependencies.

pub mod adapters;
pub mod config;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod pipelines;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
