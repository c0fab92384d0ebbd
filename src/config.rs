//! Configuration
//!
//! Layered: built-in defaults, then `~/.config/kopilot/config.toml` if it
//! exists, then environment variables, then CLI flags (applied by `main`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the kubeconfig; empty means kubectl's own resolution
    pub kubeconfig: String,
    /// Namespace shown on startup
    pub namespace: String,
    /// Anthropic model for the copilot
    pub model: String,
    /// Seconds between background table refreshes
    pub refresh_secs: u64,
    /// Anthropic API key; normally supplied via ANTHROPIC_API_KEY
    #[serde(skip_serializing)]
    pub anthropic_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kubeconfig: String::new(),
            namespace: "default".to_string(),
            model: DEFAULT_MODEL.to_string(),
            refresh_secs: 5,
            anthropic_key: String::new(),
        }
    }
}

impl Config {
    /// Loads defaults, the optional config file, and env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("invalid config at {}", path.display()))
    }

    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kopilot").join("config.toml"))
    }

    fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(key) = get("ANTHROPIC_API_KEY") {
            self.anthropic_key = key;
        }
        if let Some(model) = get("KOPILOT_MODEL") {
            self.model = model;
        }
        if let Some(namespace) = get("KOPILOT_NAMESPACE") {
            self.namespace = namespace;
        }
        if let Some(kubeconfig) = get("KUBECONFIG") {
            self.kubeconfig = kubeconfig;
        }
    }
}
