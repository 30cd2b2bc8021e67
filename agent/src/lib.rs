//! LLM-backed agents for maestro orchestrations
//!
//! This crate provides:
//! - The `Llm` backend abstraction with Ollama and scripted implementations
//! - Immutable, shareable `Agent`s that produce one message per turn
//! - Conversation `Message`s and the append-only `History`
//! - Response observers and orchestration events
//! - `.agent.toml` configuration loading

pub mod agent;
pub mod config;
pub mod llm;
pub mod message;

pub use agent::{
    event_channel, strip_think_tags, Agent, AgentBuilder, AgentError, EventReceiver,
    EventSender, OrchestrationEvent, ResponseCallback,
};
pub use config::{AgentFileConfig, LlmConfig};
pub use llm::{ChatRequest, Llm, OllamaClient, ScriptedLlm};
pub use message::{Author, Content, History, Message};
