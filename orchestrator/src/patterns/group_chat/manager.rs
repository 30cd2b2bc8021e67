//! Group chat manager: speaker selection, termination and result filtering
//!
//! The manager is composed rather than subclassed. A [`MaxInvocations`] base
//! ceiling is always consulted first; extension policies are consulted after
//! it in the order they were added, and the first one that votes to terminate
//! wins. The result filter then picks the chat's final output.

use std::sync::Arc;

use serde::Serialize;

use maestro_agent::History;

/// Default ceiling on agent turns per group chat
pub const DEFAULT_MAXIMUM_INVOCATION_COUNT: usize = 10;

/// Text returned by [`LastMessageBy`] when the author never spoke
pub const NO_RESULT: &str = "No result";

/// A manager decision with the reason behind it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerResult<T> {
    pub value: T,
    pub reason: String,
}

impl<T> ManagerResult<T> {
    pub fn new(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            reason: reason.into(),
        }
    }
}

/// Snapshot the manager decides on
#[derive(Debug, Clone, Copy)]
pub struct ChatState<'a> {
    pub history: &'a History,
    /// Agent turns taken so far
    pub invocation_count: usize,
    pub participants: &'a [String],
}

/// Decides whether the chat should stop before the next turn
pub trait TerminationPolicy: Send + Sync {
    fn should_terminate(&self, state: &ChatState<'_>) -> ManagerResult<bool>;
}

/// Picks the chat's final output from the accumulated history
pub trait ResultFilter: Send + Sync {
    fn filter(&self, history: &History) -> ManagerResult<String>;
}

// ============================================================================
// Termination policies
// ============================================================================

/// Stop once `maximum_invocation_count` agent turns have been taken
#[derive(Debug, Clone, Copy)]
pub struct MaxInvocations {
    pub maximum_invocation_count: usize,
}

impl TerminationPolicy for MaxInvocations {
    fn should_terminate(&self, state: &ChatState<'_>) -> ManagerResult<bool> {
        if state.invocation_count >= self.maximum_invocation_count {
            ManagerResult::new(
                true,
                format!(
                    "Maximum number of invocations ({}) reached",
                    self.maximum_invocation_count
                ),
            )
        } else {
            ManagerResult::new(false, "Invocation limit not reached")
        }
    }
}

/// Stop when the newest message is the approver's and contains a keyword
///
/// Matching is case-insensitive. An approval followed by any other message
/// no longer counts.
#[derive(Debug, Clone)]
pub struct KeywordApproval {
    approver: String,
    keyword: String,
}

impl KeywordApproval {
    pub fn new(approver: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            approver: approver.into(),
            keyword: keyword.into(),
        }
    }
}

impl TerminationPolicy for KeywordApproval {
    fn should_terminate(&self, state: &ChatState<'_>) -> ManagerResult<bool> {
        let approved = state
            .history
            .last()
            .filter(|m| m.author.is_agent(&self.approver))
            .map(|m| {
                m.text()
                    .to_lowercase()
                    .contains(&self.keyword.to_lowercase())
            })
            .unwrap_or(false);

        if approved {
            ManagerResult::new(true, format!("{} approved", self.approver))
        } else {
            ManagerResult::new(false, format!("Awaiting approval from {}", self.approver))
        }
    }
}

// ============================================================================
// Result filters
// ============================================================================

/// Final output is the last message in the chat
#[derive(Debug, Clone, Copy, Default)]
pub struct LastMessage;

impl ResultFilter for LastMessage {
    fn filter(&self, history: &History) -> ManagerResult<String> {
        let text = history
            .last()
            .map(|m| m.text().into_owned())
            .unwrap_or_default();
        ManagerResult::new(text, "Last message in the conversation")
    }
}

/// Final output is the newest message by a given author
#[derive(Debug, Clone)]
pub struct LastMessageBy {
    author: String,
    fallback: String,
}

impl LastMessageBy {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            fallback: NO_RESULT.to_string(),
        }
    }

    /// Text returned when the author never spoke
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }
}

impl ResultFilter for LastMessageBy {
    fn filter(&self, history: &History) -> ManagerResult<String> {
        match history.last_by_agent(&self.author) {
            Some(message) => ManagerResult::new(
                message.text().into_owned(),
                format!("Latest message from {}", self.author),
            ),
            None => ManagerResult::new(
                self.fallback.clone(),
                format!("{} did not respond", self.author),
            ),
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Round-robin group chat manager with pluggable termination and filtering
#[derive(Clone)]
pub struct GroupChatManager {
    base: MaxInvocations,
    extensions: Vec<Arc<dyn TerminationPolicy>>,
    filter: Arc<dyn ResultFilter>,
}

impl std::fmt::Debug for GroupChatManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupChatManager")
            .field("base", &self.base)
            .field("extensions", &self.extensions.len())
            .finish_non_exhaustive()
    }
}

impl Default for GroupChatManager {
    fn default() -> Self {
        Self::round_robin(DEFAULT_MAXIMUM_INVOCATION_COUNT)
    }
}

impl GroupChatManager {
    /// Cycle through participants in order, stopping after `maximum_invocation_count` turns
    pub fn round_robin(maximum_invocation_count: usize) -> Self {
        Self {
            base: MaxInvocations {
                maximum_invocation_count,
            },
            extensions: Vec::new(),
            filter: Arc::new(LastMessage),
        }
    }

    /// Add a termination policy consulted after the invocation ceiling
    pub fn with_termination(mut self, policy: impl TerminationPolicy + 'static) -> Self {
        self.extensions.push(Arc::new(policy));
        self
    }

    /// Replace the result filter
    pub fn with_filter(mut self, filter: impl ResultFilter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn maximum_invocation_count(&self) -> usize {
        self.base.maximum_invocation_count
    }

    /// Consult the ceiling, then each extension; the first terminating vote wins
    pub fn should_terminate(&self, state: &ChatState<'_>) -> ManagerResult<bool> {
        let base = self.base.should_terminate(state);
        if base.value {
            return base;
        }

        for policy in &self.extensions {
            let decision = policy.should_terminate(state);
            if decision.value {
                return decision;
            }
        }

        ManagerResult::new(false, base.reason)
    }

    /// Index of the next speaker
    pub fn select_next(&self, state: &ChatState<'_>) -> usize {
        state.invocation_count % state.participants.len().max(1)
    }

    pub fn filter_results(&self, history: &History) -> ManagerResult<String> {
        self.filter.filter(history)
    }
}
