use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// Structure representing the application configuration. Contains naming conventions for
/// the SDE files and the layout used when assembling theta stacks.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub mapping_path: Option<PathBuf>,
    pub sde_suffix: String,
    pub extension: String,
    pub stack_prefix: String,
    pub data_name: String,
    pub angle_group: String,
    pub angle_name: String,
    pub angles_name: String,
    pub stack_compression: Option<u8>,
}

impl Default for Config {
    /// Generate a new Config object using the standard MAPS/SDE conventions
    fn default() -> Self {
        Self {
            mapping_path: None,
            sde_suffix: String::from("_SDE"),
            extension: String::from("h5"),
            stack_prefix: String::from("exchange"),
            data_name: String::from("data"),
            angle_group: String::from("exchange"),
            angle_name: String::from("angle"),
            angles_name: String::from("angles"),
            stack_compression: Some(4),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Get the path of the SDE file produced from a source file.
    ///
    /// The SDE file lives next to the source, named `<stem><suffix>.<extension>`. The stem is
    /// everything before the first `.` of the file name.
    pub fn sde_file_name(&self, source: &Path) -> Result<PathBuf, ConfigError> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ConfigError::BadFileName(source.to_path_buf()))?;
        let stem = name.split('.').next().unwrap_or(name);
        if stem.is_empty() {
            return Err(ConfigError::BadFileName(source.to_path_buf()));
        }
        let file_name = format!("{stem}{}.{}", self.sde_suffix, self.extension);
        Ok(match source.parent() {
            Some(parent) => parent.join(file_name),
            None => PathBuf::from(file_name),
        })
    }

    /// Check if a path names an SDE file (`*<suffix>.<extension>`)
    pub fn is_sde_file(&self, path: &Path) -> bool {
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.ends_with(&format!("{}.{}", self.sde_suffix, self.extension)),
            None => false,
        }
    }

    /// Check if a path names a MAPS source file: the right extension, and not an SDE product
    pub fn is_source_file(&self, path: &Path) -> bool {
        let has_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false);
        let marker = self.sde_suffix.trim_start_matches('_');
        let is_product = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.contains(marker))
            .unwrap_or(false);
        has_extension && !is_product
    }

    /// Path of the dataset that holds a file's acquisition angle
    pub fn angle_path(&self) -> String {
        format!("/{}/{}", self.angle_group, self.angle_name)
    }

    /// Check if a top-level group takes part in stacking
    pub fn is_stackable(&self, group: &str) -> bool {
        group.starts_with(&self.stack_prefix)
    }
}
