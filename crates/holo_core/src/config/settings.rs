//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::logging::{LogConfig, LogLevel};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Job workspace and log locations.
    #[serde(default)]
    pub paths: PathSettings,

    /// Per-job logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Where finished assets are delivered.
    #[serde(default)]
    pub dispatch: DispatchSettings,

    /// External segmentation tools, keyed by plid.
    #[serde(default)]
    pub segmentation: SegmentationSettings,
}

/// Path configuration for job workspaces and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root folder holding one directory per job.
    #[serde(default = "default_jobs_root")]
    pub jobs_root: String,

    /// Folder for per-job log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_jobs_root() -> String {
    "__jobs__".to_string()
}

fn default_logs_folder() -> String {
    "__jobs__/logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            jobs_root: default_jobs_root(),
            logs_folder: default_logs_folder(),
        }
    }
}

impl PathSettings {
    /// Jobs root as a path.
    pub fn jobs_root(&self) -> PathBuf {
        PathBuf::from(&self.jobs_root)
    }

    /// Logs folder as a path.
    pub fn logs_folder(&self) -> PathBuf {
        PathBuf::from(&self.logs_folder)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level written to job logs.
    #[serde(default)]
    pub level: LogLevel,

    /// Keep external tool output out of the log unless a stage fails.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of tool output lines shown after a failure.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Prefix log lines with a timestamp.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            error_tail: default_error_tail(),
            show_timestamps: true,
        }
    }
}

impl LoggingSettings {
    /// Convert into the logger configuration.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            compact: self.compact,
            error_tail: self.error_tail as usize,
            show_timestamps: self.show_timestamps,
        }
    }
}

/// Delivery mode for finished assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Copy the asset and its metadata into a local folder.
    #[default]
    Local,
    /// Upload to the storage accessor over HTTP.
    Http,
}

/// Dispatch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSettings {
    #[serde(default)]
    pub mode: DispatchMode,

    /// Destination folder for `local` mode.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    /// Storage accessor base URL for `http` mode.
    #[serde(default = "default_accessor_url")]
    pub accessor_url: String,
}

fn default_output_folder() -> String {
    "__holograms__".to_string()
}

fn default_accessor_url() -> String {
    "http://localhost:3200/api/v1".to_string()
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Local,
            output_folder: default_output_folder(),
            accessor_url: default_accessor_url(),
        }
    }
}

/// An external inference command.
///
/// `args` may contain `{input}` (intermediate volume path) and
/// `{output_dir}` (directory the tool must write its NIfTI result into).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationTool {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Segmentation tool registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationSettings {
    #[serde(default)]
    pub tools: BTreeMap<String, SegmentationTool>,
}

impl SegmentationSettings {
    /// Look up the tool configured for a plid.
    pub fn tool_for(&self, plid: &str) -> Option<&SegmentationTool> {
        self.tools.get(plid)
    }
}

/// Configuration sections that can be updated independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Logging,
    Dispatch,
    Segmentation,
}

impl ConfigSection {
    /// TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Dispatch => "dispatch",
            ConfigSection::Segmentation => "segmentation",
        }
    }

    /// All sections, in file order.
    pub fn all() -> [ConfigSection; 4] {
        [
            ConfigSection::Paths,
            ConfigSection::Logging,
            ConfigSection::Dispatch,
            ConfigSection::Segmentation,
        ]
    }
}
