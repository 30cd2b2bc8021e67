//! Sequential pipeline
//!
//! Participant order is fixed at construction. Agent N sees the input plus
//! the outputs of agents 1..N-1; the result is the last agent's output. Any
//! failure fails the whole invocation.

use std::sync::Arc;

use async_trait::async_trait;

use maestro_agent::{Agent, Content, History, ResponseCallback};

use crate::error::Result;
use crate::handle::{InvocationHandle, InvocationInfo};
use crate::orchestration::{
    apply_transform, launch, names, validate_participants, Orchestration, Outcome, TurnContext,
};
use crate::runtime::InProcessRuntime;
use crate::transform::{identity, ResultTransform};

pub const PATTERN: &str = "sequential";

/// Strict pipeline over a fixed participant order
#[derive(Clone)]
pub struct SequentialOrchestration<T = String> {
    agents: Vec<Agent>,
    callback: ResponseCallback,
    transform: Arc<dyn ResultTransform<String, T>>,
}

impl SequentialOrchestration<String> {
    /// Create a pipeline; fails on an empty or duplicate participant set
    pub fn new(agents: Vec<Agent>) -> Result<Self> {
        validate_participants(PATTERN, &agents)?;
        Ok(Self {
            agents,
            callback: ResponseCallback::none(),
            transform: identity(),
        })
    }
}

impl<T: Send + 'static> SequentialOrchestration<T> {
    /// Observe each agent's response as it completes
    pub fn with_response_callback(mut self, callback: ResponseCallback) -> Self {
        self.callback = callback;
        self
    }

    /// Convert the final output into another type
    pub fn with_result_transform<U, R>(self, transform: R) -> SequentialOrchestration<U>
    where
        U: Send + 'static,
        R: ResultTransform<String, U> + 'static,
    {
        SequentialOrchestration {
            agents: self.agents,
            callback: self.callback,
            transform: Arc::new(transform),
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }
}

async fn run(agents: &[Agent], input: Content, ctx: &mut TurnContext) -> Result<String> {
    let mut history = History::with_input(input);

    for agent in agents {
        ctx.run_turn(agent, &mut history, None).await?;
    }

    // Validation guarantees at least one agent turn
    Ok(history
        .last_agent_message()
        .map(|m| m.text().into_owned())
        .unwrap_or_default())
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Orchestration for SequentialOrchestration<T> {
    type Output = T;

    fn name(&self) -> &str {
        PATTERN
    }

    fn participants(&self) -> Vec<String> {
        names(&self.agents)
    }

    async fn invoke<I>(&self, input: I, runtime: &InProcessRuntime) -> Result<InvocationHandle<T>>
    where
        I: Into<Content> + Send,
    {
        let input = input.into();
        let agents = self.agents.clone();
        let transform = Arc::clone(&self.transform);
        let mut ctx = TurnContext::new(PATTERN, runtime, &self.callback);

        launch(
            runtime,
            InvocationInfo::new(PATTERN, self.participants()),
            self.callback.clone(),
            async move {
                let raw = run(&agents, input, &mut ctx).await?;
                let value = apply_transform(PATTERN, &transform, raw).await?;
                Ok(Outcome {
                    value,
                    turns: ctx.turns(),
                })
            },
        )
    }
}
