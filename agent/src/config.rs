//! Configuration loading

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::llm::{Llm, OllamaClient};

/// Name of the per-project configuration file
pub const CONFIG_FILE_NAME: &str = ".agent.toml";

/// Find a config file by walking up the directory tree, then checking global config.
///
/// Search order:
/// 1. Current directory and parent directories (walking up to root)
/// 2. Global config at ~/.config/maestro/
///
/// Returns the path if found, None otherwise.
pub fn find_config_file(filename: &str) -> Option<PathBuf> {
    let start = std::env::current_dir().ok()?;
    find_config_file_from(&start, filename)
}

fn find_config_file_from(start: &Path, filename: &str) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    // Walk up the directory tree
    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break, // Reached filesystem root
        }
    }

    // Fallback: Check global config
    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join("maestro").join(filename);
        if global_path.exists() {
            return Some(global_path);
        }
    }

    None
}

// ============================================================================
// .agent.toml
// ============================================================================

/// Top-level agent configuration (from .agent.toml)
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    #[serde(default)]
    pub llm: LlmConfig,
}

/// LLM configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

// Default value functions
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "qwen3:14b".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_model(),
        }
    }
}

impl LlmConfig {
    /// Build the configured backend, optionally overriding the model
    pub fn client(&self, model: Option<&str>) -> Arc<dyn Llm> {
        Arc::new(OllamaClient::new(
            &self.url,
            model.unwrap_or(&self.model),
        ))
    }
}

impl AgentFileConfig {
    /// Load config from .agent.toml
    ///
    /// Search order:
    /// 1. Walk up directory tree from cwd looking for .agent.toml
    /// 2. Check ~/.config/maestro/.agent.toml (global fallback)
    /// 3. Fall back to defaults
    pub fn load() -> Result<Self> {
        if let Some(config_path) = find_config_file(CONFIG_FILE_NAME) {
            tracing::debug!("Loading config from: {}", config_path.display());
            return Self::load_from_path(&config_path);
        }

        // No config file found, return defaults
        tracing::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
        Ok(Self::default())
    }

    /// Load from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Get the default model (for use elsewhere)
    pub fn default_model() -> String {
        default_model()
    }

    /// Get the default Ollama URL (for use elsewhere)
    pub fn default_ollama_url() -> String {
        default_ollama_url()
    }
}
