//! Group chat
//!
//! Participants share one history and take turns chosen by a
//! [`GroupChatManager`]. Before every turn, the first included, the manager is
//! asked whether to stop; when it does, its result filter picks the output.

mod manager;

pub use manager::{
    ChatState, GroupChatManager, KeywordApproval, LastMessage, LastMessageBy, ManagerResult,
    MaxInvocations, ResultFilter, TerminationPolicy, DEFAULT_MAXIMUM_INVOCATION_COUNT, NO_RESULT,
};

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

pub const PATTERN: &str = "group_chat";

/// Shared-history multi-turn conversation under a manager
#[derive(Clone)]
pub struct GroupChatOrchestration<T = String> {
    agents: Vec<Agent>,
    manager: GroupChatManager,
    callback: ResponseCallback,
    transform: Arc<dyn ResultTransform<String, T>>,
}

impl GroupChatOrchestration<String> {
    /// Create a group chat; fails on an empty or duplicate participant set
    pub fn new(manager: GroupChatManager, agents: Vec<Agent>) -> Result<Self> {
        validate_participants(PATTERN, &agents)?;
        Ok(Self {
            agents,
            manager,
            callback: ResponseCallback::none(),
            transform: identity(),
        })
    }
}

impl<T: Send + 'static> GroupChatOrchestration<T> {
    pub fn with_response_callback(mut self, callback: ResponseCallback) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_result_transform<U, R>(self, transform: R) -> GroupChatOrchestration<U>
    where
        U: Send + 'static,
        R: ResultTransform<String, U> + 'static,
    {
        GroupChatOrchestration {
            agents: self.agents,
            manager: self.manager,
            callback: self.callback,
            transform: Arc::new(transform),
        }
    }

    pub fn manager(&self) -> &GroupChatManager {
        &self.manager
    }
}

async fn run(
    agents: &[Agent],
    manager: &GroupChatManager,
    input: Content,
    ctx: &mut TurnContext,
) -> Result<String> {
    let participants = names(agents);
    let mut history = History::with_input(input);
    let mut invocation_count = 0;

    loop {
        let state = ChatState {
            history: &history,
            invocation_count,
            participants: &participants,
        };

        let decision = manager.should_terminate(&state);
        if decision.value {
            tracing::debug!(
                turns = invocation_count,
                reason = %decision.reason,
                "Group chat terminated"
            );
            ctx.callback()
                .manager_decision(PATTERN, None, &decision.reason);
            break;
        }

        let speaker = &agents[manager.select_next(&state)];
        ctx.callback()
            .manager_decision(PATTERN, Some(speaker.name()), &decision.reason);

        ctx.run_turn(speaker, &mut history, None).await?;
        invocation_count += 1;
    }

    let result = manager.filter_results(&history);
    tracing::debug!(reason = %result.reason, "Group chat result selected");
    Ok(result.value)
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Orchestration for GroupChatOrchestration<T> {
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
        let manager = self.manager.clone();
        let transform = Arc::clone(&self.transform);
        let mut ctx = TurnContext::new(PATTERN, runtime, &self.callback);

        launch(
            runtime,
            InvocationInfo::new(PATTERN, self.participants()),
            self.callback.clone(),
            async move {
                let raw = run(&agents, &manager, input, &mut ctx).await?;
                let value = apply_transform(PATTERN, &transform, raw).await?;
                Ok(Outcome {
                    value,
                    turns: ctx.turns(),
                })
            },
        )
    }
}
