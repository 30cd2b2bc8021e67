//! LLM abstraction layer

mod ollama;
mod scripted;

pub use ollama::{list_models, ModelInfo, OllamaClient};
pub use scripted::{RecordedRequest, ScriptedLlm};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message in a completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single completion request: system prompt, ordered turns and sampling settings
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// System prompt prepended to the conversation
    pub system: Option<String>,

    /// Conversation turns, oldest first
    pub messages: Vec<Message>,

    /// Sampling temperature (0.0 = deterministic)
    pub temperature: f32,
}

impl ChatRequest {
    /// Create a request with no system prompt
    pub fn new(messages: Vec<Message>, temperature: f32) -> Self {
        Self {
            system: None,
            messages,
            temperature,
        }
    }

    /// Set the system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// All messages including the system prompt, in send order
    pub fn full_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.extend(self.messages.iter().cloned());
        messages
    }
}

/// Trait for LLM backends
#[async_trait]
pub trait Llm: Send + Sync {
    /// Run one completion and return the generated text
    async fn chat(&self, request: &ChatRequest) -> Result<String>;

    /// Get the model name
    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_messages_puts_system_first() {
        let request = ChatRequest::new(vec![Message::user("hi")], 0.2).with_system("be brief");
        let messages = request.full_messages();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1], Message::user("hi"));
    }

    #[test]
    fn test_full_messages_without_system() {
        let request = ChatRequest::new(vec![Message::assistant("done")], 0.0);
        assert_eq!(request.full_messages(), vec![Message::assistant("done")]);
    }
}
