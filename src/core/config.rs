use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::environment::{QsysKind, DEFAULT_RETURN_VAR};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct OrcaSettings {
    /// Absolute path of the ORCA binary; looked up on PATH when unset.
    pub executable: Option<String>,
    pub directive_marker: String,
}

impl Default for OrcaSettings {
    fn default() -> Self {
        Self {
            executable: None,
            directive_marker: "#QSYS".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct QChemSettings {
    /// Q-Chem wrapper script; asked from `selector` when unset.
    pub executable: Option<String>,
    /// Program printing the path of the Q-Chem wrapper to use.
    pub selector: String,
    pub directive_marker: String,
}

impl Default for QChemSettings {
    fn default() -> Self {
        Self {
            executable: None,
            selector: "qchem-vselector".to_string(),
            directive_marker: "!QSYS".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BuilderConfig {
    pub version: String,
    pub queuing_system: QsysKind,
    pub return_variable: String,
    /// Directories prepended to PATH in every script.
    pub extra_path: Vec<String>,
    /// Added on top of memory derived from per-process hints.
    pub memory_margin_mb: u64,
    pub orca: OrcaSettings,
    pub qchem: QChemSettings,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            queuing_system: QsysKind::Auto,
            return_variable: DEFAULT_RETURN_VAR.to_string(),
            extra_path: Vec::new(),
            memory_margin_mb: 100,
            orca: OrcaSettings::default(),
            qchem: QChemSettings::default(),
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Uses `<config dir>/jobscript-builder/config.toml`.
    pub fn new() -> Result<Self> {
        let base = dirs::config_dir().context("Could not determine the configuration directory")?;
        Ok(Self::new_at(base.join("jobscript-builder").join("config.toml")))
    }

    pub fn new_at(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Writes the default configuration unless a file already exists.
    pub fn initialize(&self) -> Result<()> {
        if self.config_path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let default_config = BuilderConfig::default();
        self.save_config(&default_config)?;
        Ok(())
    }

    /// Serializes the effective configuration in `format`.
    pub fn export_config(&self, format: &str) -> Result<String> {
        let config = self.load_config()?;
        render_as(&config, format)
    }
}

/// Renders any serializable value as `json`, `yaml` or `toml` (the default).
pub fn render_as<T: Serialize>(value: &T, format: &str) -> Result<String> {
    let content = match format {
        "json" => serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?,
        "yaml" => serde_yaml::to_string(value).context("Failed to serialize to YAML")?,
        _ => toml::to_string_pretty(value).context("Failed to serialize to TOML")?,
    };
    Ok(content)
}

pub trait ConfigProvider {
    fn load_config(&self) -> Result<BuilderConfig>;
    fn save_config(&self, config: &BuilderConfig) -> Result<()>;
    fn get_config_path(&self) -> &Path;
}

impl ConfigProvider for ConfigManager {
    fn load_config(&self) -> Result<BuilderConfig> {
        if !self.config_path.exists() {
            return Ok(BuilderConfig::default());
        }

        let content =
            fs::read_to_string(&self.config_path).context("Failed to read config file")?;

        toml::from_str(&content).context("Failed to parse config file")
    }

    fn save_config(&self, config: &BuilderConfig) -> Result<()> {
        let content = toml::to_string_pretty(config).context("Failed to serialize config")?;

        fs::write(&self.config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn get_config_path(&self) -> &Path {
        &self.config_path
    }
}
