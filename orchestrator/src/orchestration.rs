//! Orchestration dispatch core
//!
//! Everything the five patterns share:
//! - The `Orchestration` trait callers invoke
//! - Participant validation at construction time
//! - `launch`, which turns a pattern's driver future into an invocation handle
//! - `TurnContext`, which runs single agent turns through the runtime, appends
//!   them to history and reports them to the response observer

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use maestro_agent::{Agent, Content, History, Message, ResponseCallback};

use crate::error::{OrchestrationError, Result};
use crate::handle::{InvocationHandle, InvocationInfo};
use crate::runtime::InProcessRuntime;
use crate::transform::ResultTransform;

/// A strategy governing turn order and termination among agents
#[async_trait]
pub trait Orchestration: Send + Sync {
    /// Value delivered through the invocation handle
    type Output: Clone + Send + 'static;

    /// Pattern name used in logs, events and errors
    fn name(&self) -> &str;

    /// Participant names in pattern order
    fn participants(&self) -> Vec<String>;

    /// Start an invocation with the given input
    ///
    /// Returns as soon as the runtime has accepted the work; the result is
    /// read from the returned handle.
    async fn invoke<I>(
        &self,
        input: I,
        runtime: &InProcessRuntime,
    ) -> Result<InvocationHandle<Self::Output>>
    where
        I: Into<Content> + Send;
}

/// Reject empty participant sets and duplicate names
pub(crate) fn validate_participants(pattern: &str, agents: &[Agent]) -> Result<()> {
    if agents.is_empty() {
        return Err(OrchestrationError::config(format!(
            "{} orchestration needs at least one participant",
            pattern
        )));
    }

    let mut seen = HashSet::new();
    for agent in agents {
        if !seen.insert(agent.name()) {
            return Err(OrchestrationError::config(format!(
                "{} orchestration has duplicate participant name {:?}",
                pattern,
                agent.name()
            )));
        }
    }

    Ok(())
}

/// Names of the given agents, in order
pub(crate) fn names(agents: &[Agent]) -> Vec<String> {
    agents.iter().map(|a| a.name().to_string()).collect()
}

/// Result of a pattern driver: the value plus how many agent turns it took
pub(crate) struct Outcome<T> {
    pub value: T,
    pub turns: usize,
}

/// Spawn a driver on the runtime and hand back its invocation handle
pub(crate) fn launch<T, F>(
    runtime: &InProcessRuntime,
    info: InvocationInfo,
    callback: ResponseCallback,
    driver: F,
) -> Result<InvocationHandle<T>>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = Result<Outcome<T>>> + Send + 'static,
{
    let (tx, rx) = watch::channel(None);
    let pattern = info.pattern.clone();
    let id = info.id.to_string();
    let participants = info.participants.clone();
    let span = tracing::info_span!("invocation", pattern = %pattern, id = %id);

    // Only accepted invocations report a start, so every start has an end
    let task = runtime.spawn(
        async move {
            callback.invocation_started(&pattern, &id, &participants);
            tracing::info!(participants = ?participants, "Starting invocation");

            let start = Instant::now();
            let result = match driver.await {
                Ok(outcome) => {
                    let duration = start.elapsed();
                    tracing::info!(
                        turns = outcome.turns,
                        duration_ms = duration.as_millis() as u64,
                        "Invocation completed"
                    );
                    callback.invocation_completed(&pattern, &id, outcome.turns, duration);
                    Ok(outcome.value)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Invocation failed");
                    callback.invocation_failed(&pattern, &id, &err.to_string());
                    Err(err)
                }
            };
            // Fails only when the handle was dropped by a caller that lost interest
            let _ = tx.send(Some(result));
        }
        .instrument(span),
    )?;

    Ok(InvocationHandle::new(info, rx, task.abort_handle()))
}

/// Apply a result transform, tagging failures with the pattern name
pub(crate) async fn apply_transform<I, T>(
    pattern: &str,
    transform: &Arc<dyn ResultTransform<I, T>>,
    raw: I,
) -> Result<T>
where
    I: Send + Sync,
{
    transform
        .transform(&raw)
        .await
        .map_err(|e| OrchestrationError::transform(pattern, e.to_string()))
}

/// An agent call handed to the runtime but not yet joined
pub(crate) struct PendingTurn {
    agent: String,
    turn: usize,
    call: JoinHandle<anyhow::Result<Message>>,
}

/// Per-invocation turn bookkeeping shared by all patterns
pub(crate) struct TurnContext {
    pattern: String,
    runtime: InProcessRuntime,
    callback: ResponseCallback,
    turns: usize,
}

impl TurnContext {
    pub fn new(pattern: &str, runtime: &InProcessRuntime, callback: &ResponseCallback) -> Self {
        Self {
            pattern: pattern.to_string(),
            runtime: runtime.clone(),
            callback: callback.clone(),
            turns: 0,
        }
    }

    /// Agent turns started so far
    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn callback(&self) -> &ResponseCallback {
        &self.callback
    }

    /// Hand an agent call to the runtime without waiting for it
    pub fn begin(
        &mut self,
        agent: &Agent,
        history: &History,
        extra_instructions: Option<String>,
    ) -> Result<PendingTurn> {
        self.turns += 1;
        tracing::debug!(
            pattern = %self.pattern,
            agent = %agent.name(),
            turn = self.turns,
            history_len = history.len(),
            "Dispatching turn"
        );

        let call = self
            .runtime
            .dispatch(agent, history.clone(), extra_instructions)?;

        Ok(PendingTurn {
            agent: agent.name().to_string(),
            turn: self.turns,
            call,
        })
    }

    /// Wait for a dispatched call, wrapping failures with turn context
    pub async fn finish(&self, pending: PendingTurn) -> Result<(usize, Message)> {
        match pending.call.await {
            Ok(Ok(message)) => Ok((pending.turn, message)),
            Ok(Err(err)) => Err(OrchestrationError::agent(
                &self.pattern,
                &pending.agent,
                pending.turn,
                &err,
            )),
            Err(join_err) => Err(OrchestrationError::AgentInvocation {
                pattern: self.pattern.clone(),
                agent: pending.agent,
                turn: pending.turn,
                message: format!("agent task did not complete: {}", join_err),
            }),
        }
    }

    /// Run one agent turn and append it to history
    pub async fn run_turn(
        &mut self,
        agent: &Agent,
        history: &mut History,
        extra_instructions: Option<String>,
    ) -> Result<Message> {
        let pending = self.begin(agent, history, extra_instructions)?;
        let (turn, message) = self.finish(pending).await?;
        Ok(self.record(history, turn, message))
    }

    /// Append a completed turn to history and notify the observer
    pub fn record(&self, history: &mut History, turn: usize, message: Message) -> Message {
        let appended = history.push(message).clone();
        self.callback.response(&self.pattern, turn, &appended);
        appended
    }
}
