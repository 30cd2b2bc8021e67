//! AgentBuilder - Ergonomic builder pattern for Agent construction
//!
//! # Example
//!
//! ```rust,ignore
//! use maestro_agent::{Agent, OllamaClient};
//!
//! let agent = Agent::builder("BudgetExpert")
//!     .with_description("Provides cost analysis for travel destinations")
//!     .with_instructions("You are a travel budget expert.")
//!     .with_temperature(0.7)
//!     .with_llm(Arc::new(OllamaClient::new("http://localhost:11434", "qwen3:14b")))
//!     .build()?;
//! ```

use std::sync::Arc;

use crate::llm::{Llm, OllamaClient};

use super::{Agent, AgentError, DEFAULT_TEMPERATURE};

/// Builder for constructing Agent instances
pub struct AgentBuilder {
    name: String,
    description: String,
    instructions: String,
    temperature: f32,
    llm: Option<Arc<dyn Llm>>,
}

impl AgentBuilder {
    /// Create a new AgentBuilder with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            llm: None,
        }
    }

    /// Set the description used by managers for routing decisions
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the system instructions
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Set sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Use an existing LLM backend
    pub fn with_llm(mut self, llm: Arc<dyn Llm>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Use an Ollama backend at the given URL
    pub fn with_ollama(self, url: &str, model: &str) -> Self {
        self.with_llm(Arc::new(OllamaClient::new(url, model)))
    }

    /// Build the Agent
    ///
    /// Returns an error if the name is empty, the temperature is out of
    /// range, or no backend was provided.
    pub fn build(self) -> Result<Agent, AgentError> {
        let llm = self
            .llm
            .ok_or_else(|| AgentError::MissingBackend(self.name.clone()))?;

        Agent::from_parts(
            self.name,
            self.description,
            self.instructions,
            self.temperature,
            llm,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;

    #[test]
    fn test_builder_sets_fields() {
        let agent = AgentBuilder::new("Editor")
            .with_description("Reviews work")
            .with_instructions("Be strict")
            .with_temperature(0.4)
            .with_llm(Arc::new(ScriptedLlm::constant("ok").with_model("test-model")))
            .build()
            .unwrap();

        assert_eq!(agent.name(), "Editor");
        assert_eq!(agent.description(), "Reviews work");
        assert_eq!(agent.instructions(), "Be strict");
        assert_eq!(agent.temperature(), 0.4);
        assert_eq!(agent.model(), "test-model");
    }

    #[test]
    fn test_builder_requires_backend() {
        let result = AgentBuilder::new("Lonely").build();
        assert_eq!(
            result.unwrap_err(),
            AgentError::MissingBackend("Lonely".to_string())
        );
    }

    #[test]
    fn test_with_ollama_uses_model() {
        let agent = AgentBuilder::new("Local")
            .with_ollama("http://localhost:11434", "llama3.1:8b")
            .build()
            .unwrap();
        assert_eq!(agent.model(), "llama3.1:8b");
        assert_eq!(agent.temperature(), DEFAULT_TEMPERATURE);
    }
}
