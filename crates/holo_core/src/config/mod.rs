//! Pipelines configuration file.
//!
//! One TOML file with four tables (`paths`, `logging`, `dispatch`,
//! `segmentation`). Every key has a default, so an empty file is valid.
//! Segmentation commands are registered per plid:
//!
//! ```toml
//! [segmentation.tools.lung_segmentation]
//! program = "lungmask"
//! args = ["{input}", "{output_dir}/lungs.nii"]
//! ```
//!
//! # Example
//!
//! ```no_run
//! use holo_core::config::{ConfigManager, ConfigSection, DispatchMode};
//!
//! let mut config = ConfigManager::new(".config/holo.toml");
//! config.load_or_create().unwrap();
//!
//! config.settings_mut().dispatch.mode = DispatchMode::Http;
//! config.update_section(ConfigSection::Dispatch).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    ConfigSection, DispatchMode, DispatchSettings, LoggingSettings, PathSettings,
    SegmentationSettings, SegmentationTool, Settings,
};
