use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::evaluator::{EvaluatorSettings, DEFAULT_ENTRY_POINT};

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("IO error reading config: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Prefix marking a prompt as a bridge call
    #[serde(default = "default_invocation_prefix")]
    pub invocation_prefix: String,

    /// Namespace of the built-in interface the scripted shim talks to
    #[serde(default = "default_reserved_namespace")]
    pub reserved_namespace: String,

    /// Batching window for outgoing scripts (default: 50ms)
    #[serde(default = "default_debounce_interval")]
    pub debounce_interval_ms: u64,

    /// Scripted-side function receiving host-initiated calls
    #[serde(default = "default_dispatch_entry_point")]
    pub dispatch_entry_point: String,

    /// Scripted-side method answering `has_script_method`
    #[serde(default = "default_method_query_function")]
    pub method_query_function: String,
}

fn default_invocation_prefix() -> String {
    "_dsbridge=".to_string()
}

fn default_reserved_namespace() -> String {
    "_dsb".to_string()
}

fn default_debounce_interval() -> u64 {
    50
}

fn default_dispatch_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

fn default_method_query_function() -> String {
    "_hasJavascriptMethod".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            invocation_prefix: default_invocation_prefix(),
            reserved_namespace: default_reserved_namespace(),
            debounce_interval_ms: default_debounce_interval(),
            dispatch_entry_point: default_dispatch_entry_point(),
            method_query_function: default_method_query_function(),
        }
    }
}

impl BridgeConfig {
    /// Default location, `None` when no home directory can be determined.
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "promptbridge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigLoadError> {
        let path = Self::config_path()
            .ok_or_else(|| ConfigLoadError::NotFound(PathBuf::from("config.toml")))?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigLoadError> {
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigLoadError::Io(e.to_string()))?;
        let config = toml::from_str(&content).map_err(|e| ConfigLoadError::Parse(e.to_string()))?;
        info!(target: "bridge", "Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        info!(target: "bridge", "Saved config to {}", path.display());
        Ok(())
    }

    pub fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_interval_ms)
    }

    pub fn evaluator_settings(&self) -> EvaluatorSettings {
        EvaluatorSettings {
            debounce_interval: self.debounce_interval(),
            entry_point: self.dispatch_entry_point.clone(),
        }
    }
}
