//! Orchestration error taxonomy

use std::time::Duration;

use maestro_agent::AgentError;

/// Errors that can occur while configuring or running an orchestration
///
/// Errors are `Clone` so a resolved invocation handle can hand the same
/// failure to every reader.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrchestrationError {
    #[error("{pattern}: agent {agent} failed at turn {turn}: {message}")]
    AgentInvocation {
        pattern: String,
        agent: String,
        turn: usize,
        message: String,
    },

    #[error("{pattern}: invocation timed out after {timeout:?}")]
    InvocationTimeout { pattern: String, timeout: Duration },

    #[error("handoff: {from} may not hand off to {to} (turn {turn})")]
    IllegalHandoff { from: String, to: String, turn: usize },

    #[error("{pattern}: maximum invocation count {limit} reached without termination")]
    MaxInvocationsExceeded { pattern: String, limit: usize },

    #[error("{pattern}: invalid manager decision: {reason}")]
    InvalidManagerDecision { pattern: String, reason: String },

    #[error("{pattern}: result transform failed: {reason}")]
    Transform { pattern: String, reason: String },

    #[error("{pattern}: invocation was cancelled before producing a result")]
    Cancelled { pattern: String },

    #[error("Runtime has been stopped")]
    RuntimeStopped,

    #[error("Runtime has not been started")]
    RuntimeNotStarted,

    #[error("Runtime already started")]
    AlreadyStarted,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl OrchestrationError {
    pub(crate) fn agent(pattern: &str, agent: &str, turn: usize, err: &anyhow::Error) -> Self {
        Self::AgentInvocation {
            pattern: pattern.to_string(),
            agent: agent.to_string(),
            turn,
            // {:#} keeps the whole context chain on one line
            message: format!("{:#}", err),
        }
    }

    pub(crate) fn transform(pattern: &str, reason: impl Into<String>) -> Self {
        Self::Transform {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// True for errors raised by misuse of the runtime lifecycle
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::RuntimeStopped | Self::RuntimeNotStarted | Self::AlreadyStarted
        )
    }
}

impl From<AgentError> for OrchestrationError {
    fn from(err: AgentError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Convenience alias
pub type Result<T, E = OrchestrationError> = std::result::Result<T, E>;
