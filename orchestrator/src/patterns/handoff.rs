//! Handoff routing
//!
//! Exactly one agent is active at a time. The active agent either resolves
//! the request or transfers control along a declared edge of the handoff
//! graph by ending its reply with a `HANDOFF: <agent>` line. The routing
//! options are appended to the active agent's instructions on every turn.
//!
//! A transfer to an agent that is not a declared target of the active agent
//! is handled by [`IllegalHandoffPolicy`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use maestro_agent::{strip_think_tags, Agent, Author, Content, History, Message, ResponseCallback};

use crate::config::HandoffConfig;
use crate::error::{OrchestrationError, Result};
use crate::handle::{InvocationHandle, InvocationInfo};
use crate::orchestration::{
    apply_transform, launch, names, validate_participants, Orchestration, Outcome, TurnContext,
};
use crate::runtime::InProcessRuntime;
use crate::transform::{identity, ResultTransform};

pub const PATTERN: &str = "handoff";

/// Line prefix an agent uses to transfer control
pub const HANDOFF_PREFIX: &str = "HANDOFF:";

/// What to do when an agent names a target it has no edge to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IllegalHandoffPolicy {
    /// Fail the invocation with `IllegalHandoff`
    #[default]
    Fail,
    /// Keep the current agent active and tell it the transfer was refused
    RetainTurn,
}

// ============================================================================
// Graph declaration
// ============================================================================

/// One outgoing edge of the handoff graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffEdge {
    pub target: String,
    /// When to take this edge; defaults to the target agent's description
    pub description: Option<String>,
}

/// Builder for the handoff graph
///
/// ```rust,ignore
/// let handoffs = OrchestrationHandoffs::start_with(&front_desk)
///     .add(&front_desk, [&tech, &billing])
///     .add_with_description(&tech, &front_desk, "Transfer back for non-technical issues")
///     .add(&billing, [&front_desk]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct OrchestrationHandoffs {
    start: String,
    edges: BTreeMap<String, Vec<HandoffEdge>>,
}

impl OrchestrationHandoffs {
    /// Declare the agent that receives the input
    pub fn start_with(agent: impl AsRef<str>) -> Self {
        Self {
            start: agent.as_ref().to_string(),
            edges: BTreeMap::new(),
        }
    }

    /// Allow `from` to transfer to each of `targets`
    pub fn add<I, A>(mut self, from: impl AsRef<str>, targets: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        for target in targets {
            self.push_edge(from.as_ref(), target.as_ref(), None);
        }
        self
    }

    /// Allow `from` to transfer to `to`, describing when to do so
    pub fn add_with_description(
        mut self,
        from: impl AsRef<str>,
        to: impl AsRef<str>,
        description: impl Into<String>,
    ) -> Self {
        self.push_edge(from.as_ref(), to.as_ref(), Some(description.into()));
        self
    }

    fn push_edge(&mut self, from: &str, to: &str, description: Option<String>) {
        let edges = self.edges.entry(from.to_string()).or_default();
        // Re-declaring an edge replaces its description
        edges.retain(|e| e.target != to);
        edges.push(HandoffEdge {
            target: to.to_string(),
            description,
        });
    }

    pub fn start(&self) -> &str {
        &self.start
    }
}

/// Validated handoff graph over a known participant set
#[derive(Debug, Clone)]
pub struct HandoffGraph {
    start: String,
    edges: HashMap<String, Vec<HandoffEdge>>,
}

/// Next routing state after a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The active agent answered; the invocation is done
    Resolve,
    /// Control moves to another agent
    Handoff { to: String },
    /// The requested target was refused; the same agent goes again
    Retain { rejected: String },
}

impl HandoffGraph {
    /// Check that the start agent and every edge endpoint are participants
    pub fn new(handoffs: &OrchestrationHandoffs, agents: &[Agent]) -> Result<Self> {
        let known = |name: &str| agents.iter().any(|a| a.name() == name);

        if !known(&handoffs.start) {
            return Err(OrchestrationError::config(format!(
                "handoff start agent {:?} is not a participant",
                handoffs.start
            )));
        }

        for (from, edges) in &handoffs.edges {
            if !known(from) {
                return Err(OrchestrationError::config(format!(
                    "handoff source {:?} is not a participant",
                    from
                )));
            }
            for edge in edges {
                if !known(&edge.target) {
                    return Err(OrchestrationError::config(format!(
                        "handoff target {:?} (from {:?}) is not a participant",
                        edge.target, from
                    )));
                }
            }
        }

        Ok(Self {
            start: handoffs.start.clone(),
            edges: handoffs
                .edges
                .iter()
                .map(|(from, edges)| (from.clone(), edges.clone()))
                .collect(),
        })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    /// Declared targets of `from`
    pub fn targets(&self, from: &str) -> &[HandoffEdge] {
        self.edges.get(from).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether `from` may transfer to `to`
    pub fn allows(&self, from: &str, to: &str) -> bool {
        self.targets(from).iter().any(|e| e.target == to)
    }

    /// Routing section appended to the active agent's instructions
    pub fn routing_instructions(&self, active: &str, agents: &[Agent]) -> String {
        let targets = self.targets(active);
        if targets.is_empty() {
            return "## Routing\nYou cannot transfer this conversation. \
                    Resolve the request yourself."
                .to_string();
        }

        let mut section = String::from(
            "## Routing\nYou may transfer the conversation to one of these agents:\n",
        );
        for edge in targets {
            let description = edge.description.clone().unwrap_or_else(|| {
                agents
                    .iter()
                    .find(|a| a.name() == edge.target)
                    .map(|a| a.description().to_string())
                    .unwrap_or_default()
            });
            if description.is_empty() {
                section.push_str(&format!("- {}\n", edge.target));
            } else {
                section.push_str(&format!("- {}: {}\n", edge.target, description));
            }
        }
        section.push_str(&format!(
            "\nTo transfer, end your reply with a line of the form:\n{} <agent name>\n\
             If you can resolve the request yourself, reply with the resolution and no {} line.",
            HANDOFF_PREFIX, HANDOFF_PREFIX
        ));
        section
    }

    /// Apply a parsed directive to the active agent
    ///
    /// Target names match declared edges case-insensitively and are returned
    /// in their declared spelling.
    pub fn transition(
        &self,
        active: &str,
        directive: &Directive,
        turn: usize,
        policy: IllegalHandoffPolicy,
    ) -> Result<Transition> {
        let requested = match directive {
            Directive::Resolve => return Ok(Transition::Resolve),
            Directive::Handoff(target) => target,
        };

        if let Some(edge) = self
            .targets(active)
            .iter()
            .find(|e| e.target.eq_ignore_ascii_case(requested))
        {
            return Ok(Transition::Handoff {
                to: edge.target.clone(),
            });
        }

        match policy {
            IllegalHandoffPolicy::Fail => Err(OrchestrationError::IllegalHandoff {
                from: active.to_string(),
                to: requested.clone(),
                turn,
            }),
            IllegalHandoffPolicy::RetainTurn => Ok(Transition::Retain {
                rejected: requested.clone(),
            }),
        }
    }
}

// ============================================================================
// Directive parsing
// ============================================================================

/// Routing directive carried by an agent's reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Resolve,
    Handoff(String),
}

// Markdown emphasis or quoting around the prefix is tolerated
static DIRECTIVE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[\s*_`>#]*handoff\s*:(.*)$").expect("Invalid handoff directive regex")
});

fn directive_target(line: &str) -> Option<&str> {
    let rest = DIRECTIVE_LINE.captures(line)?.get(1)?.as_str();
    let target = rest
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '-');
    (!target.is_empty()).then_some(target)
}

/// Read the routing directive from a reply
///
/// The last `HANDOFF: <agent>` line wins; a reply without one resolves.
/// Lines inside `<think>` blocks are never directives.
pub fn parse_directive(text: &str) -> Directive {
    strip_think_tags(text)
        .lines()
        .rev()
        .find_map(directive_target)
        .map(|target| Directive::Handoff(target.to_string()))
        .unwrap_or(Directive::Resolve)
}

/// Reply text with directive lines and reasoning blocks removed
pub fn strip_directives(text: &str) -> String {
    strip_think_tags(text)
        .lines()
        .filter(|line| directive_target(line).is_none())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

// ============================================================================
// Orchestration
// ============================================================================

/// Route a request through specialists along a declared graph
#[derive(Clone)]
pub struct HandoffOrchestration<T = String> {
    agents: Vec<Agent>,
    graph: HandoffGraph,
    policy: IllegalHandoffPolicy,
    callback: ResponseCallback,
    transform: Arc<dyn ResultTransform<String, T>>,
}

impl HandoffOrchestration<String> {
    /// Validate the graph against the participants
    pub fn new(handoffs: OrchestrationHandoffs, agents: Vec<Agent>) -> Result<Self> {
        validate_participants(PATTERN, &agents)?;
        let graph = HandoffGraph::new(&handoffs, &agents)?;
        Ok(Self {
            agents,
            graph,
            policy: IllegalHandoffPolicy::default(),
            callback: ResponseCallback::none(),
            transform: identity(),
        })
    }
}

impl<T: Send + 'static> HandoffOrchestration<T> {
    pub fn with_illegal_handoff_policy(mut self, policy: IllegalHandoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply the `[orchestration.handoff]` settings
    pub fn with_config(self, config: &HandoffConfig) -> Self {
        self.with_illegal_handoff_policy(config.illegal_handoff_policy)
    }

    pub fn illegal_handoff_policy(&self) -> IllegalHandoffPolicy {
        self.policy
    }

    pub fn with_response_callback(mut self, callback: ResponseCallback) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_result_transform<U, R>(self, transform: R) -> HandoffOrchestration<U>
    where
        U: Send + 'static,
        R: ResultTransform<String, U> + 'static,
    {
        HandoffOrchestration {
            agents: self.agents,
            graph: self.graph,
            policy: self.policy,
            callback: self.callback,
            transform: Arc::new(transform),
        }
    }

    pub fn graph(&self) -> &HandoffGraph {
        &self.graph
    }
}

async fn run(
    agents: &[Agent],
    graph: &HandoffGraph,
    policy: IllegalHandoffPolicy,
    input: Content,
    ctx: &mut TurnContext,
) -> Result<String> {
    let mut history = History::with_input(input);
    let mut active = graph.start().to_string();

    loop {
        // Graph validation guarantees every routed name is a participant
        let agent = agents
            .iter()
            .find(|a| a.name() == active)
            .ok_or_else(|| OrchestrationError::config(format!("unknown agent {:?}", active)))?;

        let routing = graph.routing_instructions(&active, agents);
        let reply = ctx.run_turn(agent, &mut history, Some(routing)).await?;
        let text = reply.text();
        let directive = parse_directive(&text);

        match graph.transition(&active, &directive, ctx.turns(), policy)? {
            Transition::Resolve => {
                tracing::debug!(agent = %active, turns = ctx.turns(), "Request resolved");
                return Ok(strip_directives(&text));
            }
            Transition::Handoff { to } => {
                tracing::info!(from = %active, to = %to, turn = ctx.turns(), "Handoff");
                ctx.callback().handoff(&active, &to, ctx.turns());
                active = to;
            }
            Transition::Retain { rejected } => {
                tracing::warn!(
                    from = %active,
                    to = %rejected,
                    turn = ctx.turns(),
                    "Refused handoff to undeclared target"
                );
                let allowed = graph
                    .targets(&active)
                    .iter()
                    .map(|e| e.target.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                history.push(Message::new(
                    Author::System,
                    format!(
                        "Transfer to {} is not allowed. Allowed targets: {}. \
                         Resolve the request or transfer to an allowed agent.",
                        rejected,
                        if allowed.is_empty() { "none" } else { &allowed }
                    ),
                ));
            }
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Orchestration for HandoffOrchestration<T> {
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
        let graph = self.graph.clone();
        let policy = self.policy;
        let transform = Arc::clone(&self.transform);
        let mut ctx = TurnContext::new(PATTERN, runtime, &self.callback);

        launch(
            runtime,
            InvocationInfo::new(PATTERN, self.participants()),
            self.callback.clone(),
            async move {
                let raw = run(&agents, &graph, policy, input, &mut ctx).await?;
                let value = apply_transform(PATTERN, &transform, raw).await?;
                Ok(Outcome {
                    value,
                    turns: ctx.turns(),
                })
            },
        )
    }
}
