//! Host configuration
//!
//! Loaded from an optional TOML file and overlaid with `CK_*` environment
//! variables. A missing file yields the defaults.

use crate::net::{NetworkConfig, SharedNetworkConfig};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Folders provided by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Where generated files (images, videos) are written
    pub output_dir: PathBuf,

    /// Root of the model folders (`prompt_generator` lives below it)
    pub models_dir: PathBuf,

    /// Additional `prompt_generator` search paths
    pub extra_model_paths: Vec<PathBuf>,

    /// Where node configuration files such as API key stores live
    pub config_dir: PathBuf,

    /// Skip embedding workflow metadata in saved PNG files
    pub disable_metadata: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            models_dir: PathBuf::from("models"),
            extra_model_paths: Vec::new(),
            config_dir: PathBuf::from("."),
            disable_metadata: false,
        }
    }
}

impl HostConfig {
    /// Load from `path` (if given and present) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                tracing::debug!(path = %path.display(), "Host config not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            Error::config(format!("Invalid host config {}: {}", path.display(), e))
        })
    }

    /// Apply `CK_OUTPUT_DIR`, `CK_MODELS_DIR`, `CK_CONFIG_DIR` and `CK_DISABLE_METADATA`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(dir) = get("CK_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("CK_MODELS_DIR") {
            self.models_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("CK_CONFIG_DIR") {
            self.config_dir = PathBuf::from(dir);
        }
        if let Some(flag) = get("CK_DISABLE_METADATA") {
            self.disable_metadata = matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        self
    }

    /// `prompt_generator` search paths, primary folder first
    pub fn prompt_generator_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.models_dir.join("prompt_generator")];
        paths.extend(self.extra_model_paths.iter().cloned());
        paths
    }
}

/// Everything a node factory may capture at registration time
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub host: Arc<HostConfig>,
    pub network: SharedNetworkConfig,
}

impl NodeContext {
    pub fn new(host: HostConfig, network: NetworkConfig) -> Self {
        Self {
            host: Arc::new(host),
            network: network.into_shared(),
        }
    }

    /// Context sharing an existing network handle
    pub fn with_network(host: HostConfig, network: SharedNetworkConfig) -> Self {
        Self {
            host: Arc::new(host),
            network,
        }
    }
}

impl Default for NodeContext {
    fn default() -> Self {
        Self::new(HostConfig::default(), NetworkConfig::default())
    }
}
