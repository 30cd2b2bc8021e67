//! Magentic: manager-planned orchestration
//!
//! A manager looks at the task, the roster and the transcript before every
//! round and either picks the next participant (optionally with an
//! instruction for it) or declares the task complete. Turn order is not
//! predetermined. A ceiling on agent turns guarantees termination; what
//! happens when it is hit is set by [`CeilingPolicy`].
//!
//! The manager is a trait so planning can be scripted in tests;
//! [`StandardMagenticManager`] is the model-backed implementation.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use maestro_agent::llm::{self, ChatRequest, Llm};
use maestro_agent::{Agent, Author, Content, History, Message, ResponseCallback};

use crate::config::MagenticConfig;
use crate::error::{OrchestrationError, Result};
use crate::handle::{InvocationHandle, InvocationInfo};
use crate::orchestration::{
    apply_transform, launch, names, validate_participants, Orchestration, Outcome, TurnContext,
};
use crate::runtime::InProcessRuntime;
use crate::transform::{extract_json, identity, ResultTransform};

pub const PATTERN: &str = "magentic";

/// Default ceiling on agent turns per magentic invocation
pub const DEFAULT_MAXIMUM_INVOCATION_COUNT: usize = 15;

/// Outcome when the ceiling is reached before the manager completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeilingPolicy {
    /// Fail with `MaxInvocationsExceeded`
    #[default]
    Fail,
    /// Return the newest agent message as the result
    ReturnPartial,
}

/// A roster entry shown to the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantInfo {
    pub name: String,
    pub description: String,
}

impl From<&Agent> for ParticipantInfo {
    fn from(agent: &Agent) -> Self {
        Self {
            name: agent.name().to_string(),
            description: agent.description().to_string(),
        }
    }
}

/// Everything the manager decides on
#[derive(Debug, Clone, Copy)]
pub struct MagenticContext<'a> {
    pub task: &'a Content,
    pub roster: &'a [ParticipantInfo],
    pub history: &'a History,
    pub invocation_count: usize,
    pub maximum_invocation_count: usize,
}

/// The manager's plan for the next round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerDecision {
    Invoke {
        participant: String,
        instruction: Option<String>,
    },
    Complete {
        result: String,
    },
}

/// Plans each round of a magentic orchestration
#[async_trait]
pub trait MagenticManager: Send + Sync {
    async fn next_step(&self, ctx: &MagenticContext<'_>) -> anyhow::Result<ManagerDecision>;
}

// ============================================================================
// Model-backed manager
// ============================================================================

const MANAGER_PROMPT: &str = "You coordinate a team of specialists to complete a task. \
Each round you either choose the one team member who should act next, with a short \
instruction for them, or declare the task complete with the final answer. \
Reply with a single JSON object matching the schema below and nothing else.";

/// Manager reply shape
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DecisionReply {
    /// True when the task is complete
    pub is_complete: bool,
    /// Name of the team member who should act next
    #[serde(default)]
    pub next_speaker: Option<String>,
    /// What the next speaker should do
    #[serde(default)]
    pub instruction: Option<String>,
    /// Final answer, required when the task is complete
    #[serde(default)]
    pub final_answer: Option<String>,
    /// Why this decision was made
    #[serde(default)]
    pub reason: Option<String>,
}

impl DecisionReply {
    /// Interpret the reply against the transcript
    ///
    /// A completion without a final answer falls back to the newest agent
    /// message.
    pub fn into_decision(self, history: &History) -> anyhow::Result<ManagerDecision> {
        if self.is_complete {
            let result = match self.final_answer.filter(|a| !a.trim().is_empty()) {
                Some(answer) => answer,
                None => history
                    .last_agent_message()
                    .map(|m| m.text().into_owned())
                    .ok_or_else(|| anyhow::anyhow!("completed without a final answer"))?,
            };
            return Ok(ManagerDecision::Complete { result });
        }

        let participant = self
            .next_speaker
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("reply names no next speaker"))?;

        Ok(ManagerDecision::Invoke {
            participant: participant.trim().to_string(),
            instruction: self.instruction.filter(|i| !i.trim().is_empty()),
        })
    }
}

/// Manager that asks a model for each decision
pub struct StandardMagenticManager {
    llm: Arc<dyn Llm>,
    temperature: f32,
    instructions: Option<String>,
}

impl StandardMagenticManager {
    pub fn new(llm: Arc<dyn Llm>) -> Self {
        Self {
            llm,
            temperature: 0.0,
            instructions: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Extra planning guidance appended to the system prompt
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// The completion request for one planning round
    pub fn build_request(&self, ctx: &MagenticContext<'_>) -> ChatRequest {
        let schema = schemars::schema_for!(DecisionReply);
        let schema = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string());

        let mut system = format!("{}\n\nSchema:\n{}", MANAGER_PROMPT, schema);
        if let Some(extra) = &self.instructions {
            system.push_str("\n\n");
            system.push_str(extra);
        }

        let roster = ctx
            .roster
            .iter()
            .map(|p| format!("- {}: {}", p.name, p.description))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "# Task\n{}\n\n# Team\n{}\n\n# Progress\nRound {} of at most {}.\n\n# Transcript\n{}",
            ctx.task,
            roster,
            ctx.invocation_count + 1,
            ctx.maximum_invocation_count,
            ctx.history.transcript()
        );

        ChatRequest::new(vec![llm::Message::user(prompt)], self.temperature).with_system(system)
    }
}

#[async_trait]
impl MagenticManager for StandardMagenticManager {
    async fn next_step(&self, ctx: &MagenticContext<'_>) -> anyhow::Result<ManagerDecision> {
        let request = self.build_request(ctx);
        let reply = self.llm.chat(&request).await?;

        let parsed: DecisionReply = serde_json::from_str(&extract_json(&reply)).map_err(|e| {
            tracing::debug!(reply = %reply, "Manager reply did not parse");
            anyhow::anyhow!("malformed manager reply: {}", e)
        })?;
        if let Some(reason) = &parsed.reason {
            tracing::debug!(reason = %reason, "Manager reasoning");
        }

        parsed.into_decision(ctx.history)
    }
}

// ============================================================================
// Orchestration
// ============================================================================

/// Manager-planned orchestration over a roster of agents
#[derive(Clone)]
pub struct MagenticOrchestration<T = String> {
    agents: Vec<Agent>,
    manager: Arc<dyn MagenticManager>,
    maximum_invocation_count: usize,
    ceiling: CeilingPolicy,
    callback: ResponseCallback,
    transform: Arc<dyn ResultTransform<String, T>>,
}

impl MagenticOrchestration<String> {
    pub fn new(manager: impl MagenticManager + 'static, agents: Vec<Agent>) -> Result<Self> {
        validate_participants(PATTERN, &agents)?;
        Ok(Self {
            agents,
            manager: Arc::new(manager),
            maximum_invocation_count: DEFAULT_MAXIMUM_INVOCATION_COUNT,
            ceiling: CeilingPolicy::default(),
            callback: ResponseCallback::none(),
            transform: identity(),
        })
    }
}

impl<T: Send + 'static> MagenticOrchestration<T> {
    /// Bound the number of agent turns
    pub fn with_maximum_invocation_count(mut self, maximum: usize) -> Self {
        self.maximum_invocation_count = maximum;
        self
    }

    pub fn with_ceiling_policy(mut self, ceiling: CeilingPolicy) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Apply the `[orchestration.magentic]` settings
    pub fn with_config(self, config: &MagenticConfig) -> Self {
        self.with_maximum_invocation_count(config.maximum_invocation_count)
            .with_ceiling_policy(config.ceiling_policy)
    }

    pub fn ceiling_policy(&self) -> CeilingPolicy {
        self.ceiling
    }

    pub fn with_response_callback(mut self, callback: ResponseCallback) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_result_transform<U, R>(self, transform: R) -> MagenticOrchestration<U>
    where
        U: Send + 'static,
        R: ResultTransform<String, U> + 'static,
    {
        MagenticOrchestration {
            agents: self.agents,
            manager: self.manager,
            maximum_invocation_count: self.maximum_invocation_count,
            ceiling: self.ceiling,
            callback: self.callback,
            transform: Arc::new(transform),
        }
    }

    pub fn maximum_invocation_count(&self) -> usize {
        self.maximum_invocation_count
    }
}

struct Plan<'a> {
    agents: &'a [Agent],
    manager: &'a dyn MagenticManager,
    maximum_invocation_count: usize,
    ceiling: CeilingPolicy,
}

async fn run(plan: Plan<'_>, input: Content, ctx: &mut TurnContext) -> Result<String> {
    let roster: Vec<ParticipantInfo> = plan.agents.iter().map(ParticipantInfo::from).collect();
    let mut history = History::with_input(input.clone());
    let mut invocation_count = 0;

    loop {
        if invocation_count >= plan.maximum_invocation_count {
            tracing::warn!(
                limit = plan.maximum_invocation_count,
                policy = ?plan.ceiling,
                "Magentic ceiling reached"
            );
            return match plan.ceiling {
                CeilingPolicy::Fail => Err(OrchestrationError::MaxInvocationsExceeded {
                    pattern: PATTERN.to_string(),
                    limit: plan.maximum_invocation_count,
                }),
                CeilingPolicy::ReturnPartial => Ok(history
                    .last_agent_message()
                    .map(|m| m.text().into_owned())
                    .unwrap_or_default()),
            };
        }

        let decision = plan
            .manager
            .next_step(&MagenticContext {
                task: &input,
                roster: &roster,
                history: &history,
                invocation_count,
                maximum_invocation_count: plan.maximum_invocation_count,
            })
            .await
            .map_err(|e| OrchestrationError::agent(PATTERN, "manager", invocation_count + 1, &e))?;

        match decision {
            ManagerDecision::Complete { result } => {
                tracing::debug!(turns = invocation_count, "Manager declared completion");
                ctx.callback()
                    .manager_decision(PATTERN, None, "task complete");
                return Ok(result);
            }
            ManagerDecision::Invoke {
                participant,
                instruction,
            } => {
                let agent = plan
                    .agents
                    .iter()
                    .find(|a| a.name().eq_ignore_ascii_case(participant.trim()))
                    .ok_or_else(|| OrchestrationError::InvalidManagerDecision {
                        pattern: PATTERN.to_string(),
                        reason: format!("unknown participant {:?}", participant),
                    })?;

                tracing::debug!(next = %agent.name(), "Manager selected participant");
                ctx.callback().manager_decision(
                    PATTERN,
                    Some(agent.name()),
                    instruction.as_deref().unwrap_or(""),
                );

                if let Some(instruction) = instruction {
                    history.push(Message::new(Author::Manager, instruction));
                }
                ctx.run_turn(agent, &mut history, None).await?;
                invocation_count += 1;
            }
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Orchestration for MagenticOrchestration<T> {
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
        let manager = Arc::clone(&self.manager);
        let maximum_invocation_count = self.maximum_invocation_count;
        let ceiling = self.ceiling;
        let transform = Arc::clone(&self.transform);
        let mut ctx = TurnContext::new(PATTERN, runtime, &self.callback);

        launch(
            runtime,
            InvocationInfo::new(PATTERN, self.participants()),
            self.callback.clone(),
            async move {
                let plan = Plan {
                    agents: &agents,
                    manager: manager.as_ref(),
                    maximum_invocation_count,
                    ceiling,
                };
                let raw = run(plan, input, &mut ctx).await?;
                let value = apply_transform(PATTERN, &transform, raw).await?;
                Ok(Outcome {
                    value,
                    turns: ctx.turns(),
                })
            },
        )
    }
}
