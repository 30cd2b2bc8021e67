//! Orchestration patterns
//!
//! - `concurrent`: broadcast one input, collect every response
//! - `sequential`: fixed pipeline, each agent builds on the previous output
//! - `group_chat`: shared conversation under a round-robin manager
//! - `handoff`: one active agent, control moves along a declared graph
//! - `magentic`: a manager plans who acts next each round

pub mod concurrent;
pub mod group_chat;
pub mod handoff;
pub mod magentic;
pub mod sequential;

pub use concurrent::ConcurrentOrchestration;
pub use group_chat::{
    GroupChatManager, GroupChatOrchestration, KeywordApproval, LastMessage, LastMessageBy,
    ManagerResult, ResultFilter, TerminationPolicy,
};
pub use handoff::{HandoffOrchestration, IllegalHandoffPolicy, OrchestrationHandoffs};
pub use magentic::{
    CeilingPolicy, MagenticManager, MagenticOrchestration, ManagerDecision,
    StandardMagenticManager,
};
pub use sequential::SequentialOrchestration;
