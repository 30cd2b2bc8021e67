//! Agent configuration and registry
//!
//! Declares agents in TOML (`[[agents]]` tables) with per-agent model
//! selection and handoff targets, and builds runnable [`Agent`]s from them.
//!
//! ```toml
//! default_model = "qwen3:14b"
//!
//! [[agents]]
//! name = "FrontDesk"
//! description = "Routes customer requests"
//! instructions = "Greet the customer and route them."
//! temperature = 0.3
//! can_handoff_to = ["TechSupport", "BillingSupport"]
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use maestro_agent::llm::Llm;
use maestro_agent::{Agent, LlmConfig};

use crate::error::{OrchestrationError, Result};
use crate::patterns::handoff::OrchestrationHandoffs;

/// Configuration for a single agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique identifier, also the agent's name in transcripts
    pub name: String,

    /// What the agent does; shown to routers and managers
    #[serde(default)]
    pub description: String,

    /// System prompt defining agent behavior
    #[serde(default, alias = "system_prompt")]
    pub instructions: String,

    /// LLM model to use; falls back to the registry default
    #[serde(default)]
    pub model: Option<String>,

    /// Temperature for LLM sampling (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Agents this agent can hand off to
    #[serde(default)]
    pub can_handoff_to: Vec<String>,
}

fn default_temperature() -> f32 {
    maestro_agent::agent::DEFAULT_TEMPERATURE
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: instructions.into(),
            model: None,
            temperature: default_temperature(),
            can_handoff_to: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set agents this agent can hand off to
    pub fn with_handoffs(mut self, agents: Vec<String>) -> Self {
        self.can_handoff_to = agents;
        self
    }

    /// Build the agent on a given backend
    pub fn build(&self, llm: Arc<dyn Llm>) -> Result<Agent> {
        Ok(Agent::builder(&self.name)
            .with_description(&self.description)
            .with_instructions(&self.instructions)
            .with_temperature(self.temperature)
            .with_llm(llm)
            .build()?)
    }
}

/// Registry of declared agents
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, AgentConfig>,
    default_model: Option<String>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model used by agents that don't name one
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Register an agent, replacing any with the same name
    pub fn register(&mut self, config: AgentConfig) {
        self.agents.insert(config.name.clone(), config);
    }

    pub fn get(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// All agent names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AgentConfig)> {
        self.agents.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Update model for a specific agent
    pub fn set_model(&mut self, agent_name: &str, model: impl Into<String>) -> bool {
        if let Some(agent) = self.agents.get_mut(agent_name) {
            agent.model = Some(model.into());
            true
        } else {
            false
        }
    }

    /// Model an agent will run on under `llm`
    pub fn resolve_model<'a>(&'a self, config: &'a AgentConfig, llm: &'a LlmConfig) -> &'a str {
        config
            .model
            .as_deref()
            .or(self.default_model.as_deref())
            .unwrap_or(&llm.model)
    }

    fn lookup(&self, name: &str) -> Result<&AgentConfig> {
        self.get(name)
            .ok_or_else(|| OrchestrationError::config(format!("no agent named {:?}", name)))
    }

    /// Build one agent against the configured Ollama backend
    pub fn build_agent(&self, name: &str, llm: &LlmConfig) -> Result<Agent> {
        let config = self.lookup(name)?;
        let model = self.resolve_model(config, llm);
        config.build(llm.client(Some(model)))
    }

    /// Build agents in the given order, choosing each backend with `backend`
    pub fn build_agents_with<F>(&self, names: &[&str], mut backend: F) -> Result<Vec<Agent>>
    where
        F: FnMut(&AgentConfig) -> Arc<dyn Llm>,
    {
        names
            .iter()
            .map(|name| {
                let config = self.lookup(name)?;
                config.build(backend(config))
            })
            .collect()
    }

    /// Build agents in the given order against the configured Ollama backend
    pub fn build_agents(&self, names: &[&str], llm: &LlmConfig) -> Result<Vec<Agent>> {
        names.iter().map(|name| self.build_agent(name, llm)).collect()
    }

    /// Handoff graph declared by the agents' `can_handoff_to` lists
    pub fn handoffs(&self, start: &str) -> Result<OrchestrationHandoffs> {
        self.lookup(start)?;

        let mut handoffs = OrchestrationHandoffs::start_with(start);
        for name in self.names() {
            let config = &self.agents[name];
            if !config.can_handoff_to.is_empty() {
                handoffs = handoffs.add(name, &config.can_handoff_to);
            }
        }
        Ok(handoffs)
    }
}

/// Configuration file format for the agent registry
#[derive(Debug, Default, Deserialize)]
pub struct AgentRegistryConfig {
    /// Default model for agents that don't specify one
    #[serde(default)]
    pub default_model: Option<String>,

    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

impl AgentRegistryConfig {
    /// Load from TOML string
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Load from a file
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Convert to an `AgentRegistry`, rejecting duplicate names
    pub fn into_registry(self) -> Result<AgentRegistry> {
        let mut registry = AgentRegistry::new();
        if let Some(model) = self.default_model {
            registry = registry.with_default_model(model);
        }

        for agent in self.agents {
            if registry.contains(&agent.name) {
                return Err(OrchestrationError::config(format!(
                    "agent {:?} is declared more than once",
                    agent.name
                )));
            }
            registry.register(agent);
        }

        Ok(registry)
    }
}
