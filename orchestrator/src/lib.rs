//! Multi-agent orchestration on top of maestro-agent
//!
//! This crate provides:
//! - An in-process runtime that owns agent calls and tracks idle state
//! - Five orchestration patterns: concurrent, sequential, group chat,
//!   handoff and magentic
//! - Invocation handles resolved exactly once, read with a timeout
//! - Result transforms from free text to typed values
//! - TOML agent registry and orchestration settings
//!
//! # Example
//!
//! ```rust,ignore
//! use maestro::{InProcessRuntime, Orchestration, SequentialOrchestration};
//!
//! let runtime = InProcessRuntime::new();
//! runtime.start()?;
//!
//! let pipeline = SequentialOrchestration::new(vec![analyst, writer, editor])?;
//! let handle = pipeline.invoke("Launch copy for a water bottle", &runtime).await?;
//! let copy = handle.get_value(Duration::from_secs(120)).await?;
//!
//! runtime.run_until_idle().await;
//! runtime.stop();
//! ```

pub mod agent_config;
pub mod config;
pub mod error;
pub mod handle;
pub mod orchestration;
pub mod patterns;
pub mod runtime;
pub mod telemetry;
pub mod transform;

pub use agent_config::{AgentConfig, AgentRegistry, AgentRegistryConfig};
pub use config::OrchestrationConfig;
pub use error::{OrchestrationError, Result};
pub use handle::{InvocationHandle, InvocationInfo};
pub use orchestration::Orchestration;
pub use patterns::{
    CeilingPolicy, ConcurrentOrchestration, GroupChatManager, GroupChatOrchestration,
    HandoffOrchestration, IllegalHandoffPolicy, KeywordApproval, LastMessage, LastMessageBy,
    MagenticManager, MagenticOrchestration, ManagerDecision, ManagerResult,
    OrchestrationHandoffs, ResultFilter, SequentialOrchestration, StandardMagenticManager,
    TerminationPolicy,
};
pub use runtime::{InProcessRuntime, RuntimeStatus};
pub use transform::{
    FnTransform, ResultTransform, SectionTransform, StructuredOutputTransform, TransformError,
};

/// Re-export commonly used types from the agent crate
pub use maestro_agent::{
    event_channel, Agent, Author, Content, History, LlmConfig, Message, OrchestrationEvent,
    ResponseCallback, ScriptedLlm,
};
