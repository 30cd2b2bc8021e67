//! Concurrent fan-out / fan-in
//!
//! Every participant receives the same input on an isolated branch holding
//! only that input, so no agent sees another's output. Branches run in
//! parallel and are appended to the invocation history in participant order
//! once all of them have completed. One failure fails the invocation;
//! there is no partial result.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;

use maestro_agent::{Agent, Content, History, Message, ResponseCallback};

use crate::error::Result;
use crate::handle::{InvocationHandle, InvocationInfo};
use crate::orchestration::{
    apply_transform, launch, names, validate_participants, Orchestration, Outcome, TurnContext,
};
use crate::runtime::InProcessRuntime;
use crate::transform::{identity, ResultTransform};

pub const PATTERN: &str = "concurrent";

/// Broadcast one input to all participants and collect every response
///
/// The raw result is one message per participant, in participant order.
#[derive(Clone)]
pub struct ConcurrentOrchestration<T = Vec<Message>> {
    agents: Vec<Agent>,
    callback: ResponseCallback,
    transform: Arc<dyn ResultTransform<Vec<Message>, T>>,
}

impl ConcurrentOrchestration<Vec<Message>> {
    /// Create a fan-out over `agents`; fails on an empty or duplicate set
    pub fn new(agents: Vec<Agent>) -> Result<Self> {
        validate_participants(PATTERN, &agents)?;
        Ok(Self {
            agents,
            callback: ResponseCallback::none(),
            transform: identity(),
        })
    }
}

impl<T: Send + 'static> ConcurrentOrchestration<T> {
    pub fn with_response_callback(mut self, callback: ResponseCallback) -> Self {
        self.callback = callback;
        self
    }

    /// Convert the collected responses into another type
    pub fn with_result_transform<U, R>(self, transform: R) -> ConcurrentOrchestration<U>
    where
        U: Send + 'static,
        R: ResultTransform<Vec<Message>, U> + 'static,
    {
        ConcurrentOrchestration {
            agents: self.agents,
            callback: self.callback,
            transform: Arc::new(transform),
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }
}

async fn run(agents: &[Agent], input: Content, ctx: &mut TurnContext) -> Result<Vec<Message>> {
    let seed = History::with_input(input);

    // Fan out: every call is handed to the runtime before any is awaited
    let mut pending = Vec::with_capacity(agents.len());
    for agent in agents {
        pending.push(ctx.begin(agent, &seed, None)?);
    }

    let ctx = &*ctx;
    let completed = try_join_all(pending.into_iter().map(|turn| ctx.finish(turn))).await?;

    // Fan in: try_join_all preserves participant order, and recording after
    // the join gives observers the same sequence numbers as the result
    let mut history = seed;
    let seeded = history.len();
    for (turn, message) in completed {
        ctx.record(&mut history, turn, message);
    }

    Ok(history.into_messages().into_iter().skip(seeded).collect())
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Orchestration for ConcurrentOrchestration<T> {
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
