//! Orchestration events for real-time visibility
//!
//! Every completed agent turn is reported through a [`ResponseCallback`]:
//! a synchronous closure, an event channel, or both. Channel subscribers also
//! see invocation lifecycle, handoff and manager events.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::message::Message;

// ============================================================================
// Orchestration Events
// ============================================================================

/// Events emitted while an orchestration runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    /// An invocation has been accepted by the runtime
    InvocationStarted {
        pattern: String,
        invocation_id: String,
        participants: Vec<String>,
    },

    /// An agent completed its turn
    AgentResponse {
        pattern: String,
        /// One-based turn index within the invocation
        turn: usize,
        message: Message,
    },

    /// Turn ownership moved along a handoff edge
    Handoff { from: String, to: String, turn: usize },

    /// A manager picked the next speaker or ended the conversation
    ManagerDecision {
        pattern: String,
        /// `None` when the manager terminated the conversation
        next: Option<String>,
        reason: String,
    },

    /// The invocation produced its result
    InvocationCompleted {
        pattern: String,
        invocation_id: String,
        turns: usize,
        #[serde(with = "duration_millis")]
        duration: Duration,
    },

    /// The invocation failed
    InvocationFailed {
        pattern: String,
        invocation_id: String,
        error: String,
    },
}

/// Serialize Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// ============================================================================
// Event Channel
// ============================================================================

/// Sender for orchestration events
pub type EventSender = mpsc::UnboundedSender<OrchestrationEvent>;

/// Receiver for orchestration events
pub type EventReceiver = mpsc::UnboundedReceiver<OrchestrationEvent>;

/// Create a new event channel
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

// ============================================================================
// Response Callback
// ============================================================================

type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Per-message observer invoked synchronously as each agent turn completes
///
/// The closure runs on the orchestration's driver task, so it must return
/// quickly; hand slow work off to a channel instead.
#[derive(Clone, Default)]
pub struct ResponseCallback {
    callback: Option<Callback>,
    sender: Option<EventSender>,
}

impl fmt::Debug for ResponseCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCallback")
            .field("callback", &self.callback.is_some())
            .field("sender", &self.sender.is_some())
            .finish()
    }
}

impl ResponseCallback {
    /// Observe responses with a closure
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
            sender: None,
        }
    }

    /// Forward every event to a channel
    pub fn from_sender(sender: EventSender) -> Self {
        Self {
            callback: None,
            sender: Some(sender),
        }
    }

    /// Create a no-op observer (events are discarded)
    pub fn none() -> Self {
        Self::default()
    }

    /// Also forward events to a channel
    pub fn with_sender(mut self, sender: EventSender) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Check if anything is listening
    pub fn is_active(&self) -> bool {
        self.callback.is_some() || self.sender.is_some()
    }

    /// Send an event (silently fails if no sender or receiver dropped)
    pub fn send(&self, event: OrchestrationEvent) {
        if let Some(ref sender) = self.sender {
            // Ignore send errors - receiver may have dropped
            let _ = sender.send(event);
        }
    }

    /// Report a completed agent turn
    pub fn response(&self, pattern: &str, turn: usize, message: &Message) {
        if let Some(ref callback) = self.callback {
            callback(message);
        }
        if self.sender.is_some() {
            self.send(OrchestrationEvent::AgentResponse {
                pattern: pattern.to_string(),
                turn,
                message: message.clone(),
            });
        }
    }

    /// Send invocation start event
    pub fn invocation_started(&self, pattern: &str, invocation_id: &str, participants: &[String]) {
        self.send(OrchestrationEvent::InvocationStarted {
            pattern: pattern.to_string(),
            invocation_id: invocation_id.to_string(),
            participants: participants.to_vec(),
        });
    }

    /// Send handoff event
    pub fn handoff(&self, from: &str, to: &str, turn: usize) {
        self.send(OrchestrationEvent::Handoff {
            from: from.to_string(),
            to: to.to_string(),
            turn,
        });
    }

    /// Send manager decision event
    pub fn manager_decision(&self, pattern: &str, next: Option<&str>, reason: &str) {
        self.send(OrchestrationEvent::ManagerDecision {
            pattern: pattern.to_string(),
            next: next.map(str::to_string),
            reason: reason.to_string(),
        });
    }

    /// Send invocation completed event
    pub fn invocation_completed(
        &self,
        pattern: &str,
        invocation_id: &str,
        turns: usize,
        duration: Duration,
    ) {
        self.send(OrchestrationEvent::InvocationCompleted {
            pattern: pattern.to_string(),
            invocation_id: invocation_id.to_string(),
            turns,
            duration,
        });
    }

    /// Send invocation failed event
    pub fn invocation_failed(&self, pattern: &str, invocation_id: &str, error: &str) {
        self.send(OrchestrationEvent::InvocationFailed {
            pattern: pattern.to_string(),
            invocation_id: invocation_id.to_string(),
            error: error.to_string(),
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
