//! Nocturne configuration file handling

use anyhow::{Context, Result};
use nocturne_theme::{DynamicThemeFix, FilterConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "nocturne.toml";

/// Top-level configuration (nocturne.toml)
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct NocturneConfig {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub fix: DynamicThemeFix,
    #[serde(default)]
    pub render: RenderConfig,
}

/// How the synthetic page is set up
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
pub struct RenderConfig {
    /// Render as an embedded frame (no root element overrides)
    #[serde(default)]
    pub iframe: bool,
    /// Inline `style` attributes to put on synthetic body elements
    #[serde(default)]
    pub inline: Vec<String>,
}

impl NocturneConfig {
    /// Load configuration from a directory (looks for nocturne.toml) or a file
    pub fn load(path: &Path) -> Result<Self> {
        let config_path = if path.is_file() {
            path.to_path_buf()
        } else {
            path.join(CONFIG_FILE)
        };

        if !config_path.exists() {
            anyhow::bail!(
                "No {} found in {}. Run `nocturne init` to create one.",
                CONFIG_FILE,
                path.display()
            );
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    /// Load when present, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let config_path = if path.is_file() {
            path.to_path_buf()
        } else {
            path.join(CONFIG_FILE)
        };
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
