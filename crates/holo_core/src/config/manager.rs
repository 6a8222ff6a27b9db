//! Loading and saving the pipelines config file.
//!
//! - Writes go to `<file>.toml.tmp` and are renamed into place
//! - `update_section` rewrites one table through `toml_edit`, leaving
//!   comments and the other tables as the operator wrote them
//! - Keys missing from the file take their serde defaults

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Failed to parse config for editing: {0}")]
    EditParseError(#[from] toml_edit::TomlError),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Owns one config file and the settings parsed from it.
pub struct ConfigManager {
    path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Manager for `path`, holding defaults until `load` is called.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// In-memory edits; persist with `save` or `update_section`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.path.exists() {
            return Err(ConfigError::NotFound(self.path.clone()));
        }
        self.settings = toml::from_str(&fs::read_to_string(&self.path)?)?;
        Ok(())
    }

    /// Load the file, writing a commented default one first if missing.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if self.path.exists() {
            return self.load();
        }
        self.settings = Settings::default();
        self.save()
    }

    /// Rewrite the whole file from the current settings.
    pub fn save(&self) -> ConfigResult<()> {
        let mut output = String::from("# Holo pipelines configuration\n\n");
        for section in ConfigSection::all() {
            output.push_str(section_comment(section));
            output.push('\n');
            output.push_str(&self.section_document(section)?.to_string());
            output.push('\n');
        }
        self.write_atomically(&output)?;
        Ok(())
    }

    /// Replace one table in the file on disk with the current settings.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let mut doc = match fs::read_to_string(&self.path) {
            Ok(content) => content.parse::<DocumentMut>()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => DocumentMut::new(),
            Err(e) => return Err(e.into()),
        };

        let table = self.section_document(section)?;
        doc[section.table_name()] = table[section.table_name()].clone();

        self.write_atomically(&doc.to_string())?;
        Ok(())
    }

    /// A document holding only `section`, so nested tables such as
    /// `segmentation.tools.<plid>` get their full header path.
    fn section_document(&self, section: ConfigSection) -> ConfigResult<DocumentMut> {
        let body = match section {
            ConfigSection::Paths => toml::to_string_pretty(&self.settings.paths)?,
            ConfigSection::Logging => toml::to_string_pretty(&self.settings.logging)?,
            ConfigSection::Dispatch => toml::to_string_pretty(&self.settings.dispatch)?,
            ConfigSection::Segmentation => toml::to_string_pretty(&self.settings.segmentation)?,
        };
        let parsed: DocumentMut = body.parse()?;

        let mut doc = DocumentMut::new();
        doc[section.table_name()] = Item::Table(parsed.as_table().clone());
        Ok(doc)
    }

    fn write_atomically(&self, content: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)
    }
}

fn section_comment(section: ConfigSection) -> &'static str {
    match section {
        ConfigSection::Paths => "# Job workspaces and logs",
        ConfigSection::Logging => "# Per-job logging",
        ConfigSection::Dispatch => "# Delivery of finished assets (local | http)",
        ConfigSection::Segmentation => {
            "# External segmentation commands; args may use {input} and {output_dir}"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatchMode, SegmentationTool};
    use tempfile::tempdir;

    #[test]
    fn load_or_create_creates_default() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(".config").join("holo.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[paths]"));
        assert!(content.contains("[dispatch]"));

        let mut reloaded = ConfigManager::new(&config_path);
        reloaded.load().unwrap();
        assert_eq!(reloaded.settings(), &Settings::default());
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let mut manager = ConfigManager::new(dir.path().join("missing.toml"));
        assert!(matches!(manager.load(), Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn load_or_create_preserves_existing() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("holo.toml");
        fs::write(&config_path, "[dispatch]\nmode = \"http\"\n").unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert_eq!(manager.settings().dispatch.mode, DispatchMode::Http);
        assert_eq!(manager.settings().paths.jobs_root, "__jobs__");
    }

    #[test]
    fn update_section_only_changes_target() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("holo.toml");
        fs::write(
            &config_path,
            "# keep me\n[paths]\njobs_root = \"/data/jobs\"\n",
        )
        .unwrap();

        let mut manager = ConfigManager::new(&config_path);
        manager.load().unwrap();
        manager.settings_mut().segmentation.tools.insert(
            "lung_segmentation".to_string(),
            SegmentationTool {
                program: "lungmask".to_string(),
                args: vec!["{input}".to_string()],
            },
        );
        manager.update_section(ConfigSection::Segmentation).unwrap();

        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("# keep me"));
        assert!(content.contains("jobs_root = \"/data/jobs\""));

        let mut reloaded = ConfigManager::new(&config_path);
        reloaded.load().unwrap();
        assert!(reloaded
            .settings()
            .segmentation
            .tool_for("lung_segmentation")
            .is_some());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("holo.toml");

        let mut manager = ConfigManager::new(&config_path);
        manager.load_or_create().unwrap();

        assert!(!config_path.with_extension("toml.tmp").exists());
    }
}
