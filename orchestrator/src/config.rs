//! Orchestration settings
//!
//! Read from the `[orchestration]` tables of `.agent.toml`, found the same way
//! as the LLM settings (walk up from the working directory, then the global
//! config directory). Every value has a default, so the section is optional.
//!
//! ```toml
//! [orchestration]
//! default_timeout_secs = 300
//!
//! [orchestration.group_chat]
//! maximum_invocation_count = 10
//!
//! [orchestration.magentic]
//! maximum_invocation_count = 15
//! ceiling_policy = "fail"            # or "return_partial"
//!
//! [orchestration.handoff]
//! illegal_handoff_policy = "fail"    # or "retain_turn"
//! ```
//!
//! Each section is applied with the matching pattern hook:
//! [`GroupChatConfig::manager`], `MagenticOrchestration::with_config` and
//! `HandoffOrchestration::with_config`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use maestro_agent::config::{find_config_file, CONFIG_FILE_NAME};

use crate::patterns::group_chat::{self, GroupChatManager};
use crate::patterns::handoff::IllegalHandoffPolicy;
use crate::patterns::magentic::{self, CeilingPolicy};

fn default_timeout_secs() -> u64 {
    300
}

fn default_group_chat_ceiling() -> usize {
    group_chat::DEFAULT_MAXIMUM_INVOCATION_COUNT
}

fn default_magentic_ceiling() -> usize {
    magentic::DEFAULT_MAXIMUM_INVOCATION_COUNT
}

/// `[orchestration]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrchestrationConfig {
    /// Deadline callers use when reading invocation handles
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    #[serde(default)]
    pub group_chat: GroupChatConfig,

    #[serde(default)]
    pub magentic: MagenticConfig,

    #[serde(default)]
    pub handoff: HandoffConfig,
}

/// `[orchestration.group_chat]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupChatConfig {
    #[serde(default = "default_group_chat_ceiling")]
    pub maximum_invocation_count: usize,
}

/// `[orchestration.magentic]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MagenticConfig {
    #[serde(default = "default_magentic_ceiling")]
    pub maximum_invocation_count: usize,

    #[serde(default)]
    pub ceiling_policy: CeilingPolicy,
}

/// `[orchestration.handoff]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HandoffConfig {
    #[serde(default)]
    pub illegal_handoff_policy: IllegalHandoffPolicy,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            group_chat: GroupChatConfig::default(),
            magentic: MagenticConfig::default(),
            handoff: HandoffConfig::default(),
        }
    }
}

impl Default for GroupChatConfig {
    fn default() -> Self {
        Self {
            maximum_invocation_count: default_group_chat_ceiling(),
        }
    }
}

impl Default for MagenticConfig {
    fn default() -> Self {
        Self {
            maximum_invocation_count: default_magentic_ceiling(),
            ceiling_policy: CeilingPolicy::default(),
        }
    }
}

impl GroupChatConfig {
    /// Round-robin manager with the configured ceiling
    pub fn manager(&self) -> GroupChatManager {
        GroupChatManager::round_robin(self.maximum_invocation_count)
    }
}

/// The parts of `.agent.toml` this crate reads
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    orchestration: OrchestrationConfig,
}

impl OrchestrationConfig {
    /// Load from `.agent.toml`, falling back to defaults when none is found
    pub fn load() -> Result<Self> {
        if let Some(config_path) = find_config_file(CONFIG_FILE_NAME) {
            tracing::debug!("Loading orchestration config from: {}", config_path.display());
            return Self::load_from_path(&config_path);
        }

        tracing::debug!("No {} found, using orchestration defaults", CONFIG_FILE_NAME);
        Ok(Self::default())
    }

    /// Load from a specific file
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse the `[orchestration]` tables out of a whole config file
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(toml_str)?;
        Ok(file.orchestration)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}
