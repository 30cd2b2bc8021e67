//! Conversation messages and append-only history

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Author {
    /// The caller's input
    User,
    /// A participating agent, by name
    Agent(String),
    /// An orchestration manager (e.g. magentic planner instructions)
    Manager,
    /// Notes injected by the orchestration driver
    System,
}

impl Author {
    pub fn agent(name: impl Into<String>) -> Self {
        Self::Agent(name.into())
    }

    /// Display name of the author
    pub fn name(&self) -> &str {
        match self {
            Author::User => "user",
            Author::Agent(name) => name,
            Author::Manager => "manager",
            Author::System => "system",
        }
    }

    /// True if this is the named agent
    pub fn is_agent(&self, name: &str) -> bool {
        matches!(self, Author::Agent(n) if n == name)
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Message payload: free text or a structured JSON value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Content {
    Text(String),
    Structured(serde_json::Value),
}

impl Content {
    /// Text view of the content; structured payloads are rendered as JSON
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Content::Text(text) => Cow::Borrowed(text),
            Content::Structured(value) => Cow::Owned(value.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(text) => text.trim().is_empty(),
            Content::Structured(value) => value.is_null(),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        Content::Structured(value)
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// A single immutable conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub author: Author,
    pub content: Content,
    /// Position in the owning history (assigned on append)
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(author: Author, content: impl Into<Content>) -> Self {
        Self {
            author,
            content: content.into(),
            sequence: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<Content>) -> Self {
        Self::new(Author::User, content)
    }

    pub fn from_agent(name: impl Into<String>, content: impl Into<Content>) -> Self {
        Self::new(Author::Agent(name.into()), content)
    }

    /// Text view of the content
    pub fn text(&self) -> Cow<'_, str> {
        self.content.as_text()
    }

    /// Author name, or `None` for user/system/manager messages
    pub fn agent_name(&self) -> Option<&str> {
        match &self.author {
            Author::Agent(name) => Some(name),
            _ => None,
        }
    }
}

/// Append-only ordered sequence of messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// History seeded with the caller's input
    pub fn with_input(input: impl Into<Content>) -> Self {
        let mut history = Self::new();
        history.push(Message::user(input));
        history
    }

    /// Append a message, assigning its sequence number
    pub fn push(&mut self, mut message: Message) -> &Message {
        message.sequence = self.messages.len() as u64;
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn first(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Newest message authored by the named agent, scanning backward
    pub fn last_by_agent(&self, name: &str) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.author.is_agent(name))
    }

    /// Newest message authored by any agent
    pub fn last_agent_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m.author, Author::Agent(_)))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Plain-text transcript, one `author: content` block per message
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.author, m.text()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_sequence() {
        let mut history = History::with_input("task");
        history.push(Message::from_agent("a", "one"));
        history.push(Message::from_agent("b", "two"));

        let sequences: Vec<u64> = history.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn test_last_by_agent_scans_backward() {
        let mut history = History::with_input("task");
        history.push(Message::from_agent("writer", "draft 1"));
        history.push(Message::from_agent("editor", "more"));
        history.push(Message::from_agent("writer", "draft 2"));
        history.push(Message::from_agent("editor", "ok"));

        assert_eq!(history.last_by_agent("writer").unwrap().text(), "draft 2");
        assert!(history.last_by_agent("nobody").is_none());
    }

    #[test]
    fn test_structured_content_renders_json() {
        let content = Content::from(serde_json::json!({"k": 1}));
        assert_eq!(content.as_text(), r#"{"k":1}"#);
        assert!(!content.is_empty());
        assert!(Content::from("  ").is_empty());
    }

    #[test]
    fn test_author_serde_shape() {
        let json = serde_json::to_value(Author::agent("Editor")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "agent", "name": "Editor"}));
    }
}
