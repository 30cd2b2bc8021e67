//! Agent module - a named, promptable responder
//!
//! An agent produces exactly one message per turn:
//! 1. The orchestration hands it the conversation history
//! 2. The history is mapped to a completion request (own turns become
//!    assistant turns, everyone else's become attributed user turns)
//! 3. The backend generates a reply
//! 4. The reply is returned as a message authored by the agent
//!
//! Agents are immutable once built and cheap to clone, so the same agent can
//! take part in several orchestrations and concurrent calls at once.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::llm::{self, ChatRequest, Llm};
use crate::message::{Author, History, Message};

pub mod builder;
pub use builder::AgentBuilder;

pub mod reasoning;
pub use reasoning::strip_think_tags;

// Response observers for real-time visibility
pub mod events;
pub use events::{
    event_channel, EventReceiver, EventSender, OrchestrationEvent, ResponseCallback,
};

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Upper bound accepted for sampling temperature
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Errors raised while constructing an agent
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("Agent name must not be empty")]
    EmptyName,

    #[error("Agent {name}: temperature {temperature} is outside [0, {max}]", max = MAX_TEMPERATURE)]
    TemperatureOutOfRange { name: String, temperature: f32 },

    #[error("Agent {0}: no LLM backend configured")]
    MissingBackend(String),
}

struct AgentInner {
    name: String,
    description: String,
    instructions: String,
    temperature: f32,
    llm: Arc<dyn Llm>,
}

/// An LLM-backed participant in an orchestration
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.inner.name)
            .field("description", &self.inner.description)
            .field("temperature", &self.inner.temperature)
            .field("model", &self.inner.llm.model())
            .finish()
    }
}

impl Agent {
    /// Create an agent with the default temperature and no description
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        llm: Arc<dyn Llm>,
    ) -> Result<Self, AgentError> {
        AgentBuilder::new(name)
            .with_instructions(instructions)
            .with_llm(llm)
            .build()
    }

    /// Start building an agent
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        description: String,
        instructions: String,
        temperature: f32,
        llm: Arc<dyn Llm>,
    ) -> Result<Self, AgentError> {
        if name.trim().is_empty() {
            return Err(AgentError::EmptyName);
        }
        if !(0.0..=MAX_TEMPERATURE).contains(&temperature) || temperature.is_nan() {
            return Err(AgentError::TemperatureOutOfRange { name, temperature });
        }

        Ok(Self {
            inner: Arc::new(AgentInner {
                name,
                description,
                instructions,
                temperature,
                llm,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    pub fn instructions(&self) -> &str {
        &self.inner.instructions
    }

    pub fn temperature(&self) -> f32 {
        self.inner.temperature
    }

    /// Model name reported by the backend
    pub fn model(&self) -> &str {
        self.inner.llm.model()
    }

    /// Produce this agent's turn for the given history
    pub async fn invoke(&self, history: &History) -> Result<Message> {
        self.invoke_with(history, None).await
    }

    /// Produce a turn with extra instructions appended to the system prompt
    ///
    /// Orchestrations use this to describe routing options (e.g. legal
    /// handoff targets) without changing the agent itself.
    pub async fn invoke_with(&self, history: &History, extra: Option<&str>) -> Result<Message> {
        let start = Instant::now();
        let request = self.build_request(history, extra);

        tracing::debug!(
            agent = %self.name(),
            model = %self.model(),
            turns = request.messages.len(),
            "Invoking agent"
        );

        let reply = self
            .inner
            .llm
            .chat(&request)
            .await
            .with_context(|| format!("agent {} failed to respond", self.name()))?;

        tracing::debug!(
            agent = %self.name(),
            duration_ms = start.elapsed().as_millis() as u64,
            chars = reply.len(),
            "Agent responded"
        );

        Ok(Message::from_agent(self.name(), strip_think_tags(&reply)))
    }

    /// Map a history to the completion request this agent would send
    pub fn build_request(&self, history: &History, extra: Option<&str>) -> ChatRequest {
        let messages = history
            .iter()
            .map(|m| match &m.author {
                Author::Agent(name) if name == self.name() => llm::Message::assistant(m.text()),
                Author::User => llm::Message::user(m.text()),
                other => llm::Message::user(format!("[{}]: {}", other, m.text())),
            })
            .collect();

        let system = match extra {
            Some(extra) if !extra.is_empty() => format!("{}\n\n{}", self.instructions(), extra),
            _ => self.instructions().to_string(),
        };

        let request = ChatRequest::new(messages, self.temperature());
        if system.is_empty() {
            request
        } else {
            request.with_system(system)
        }
    }
}

impl AsRef<str> for Agent {
    fn as_ref(&self) -> &str {
        self.name()
    }
}
