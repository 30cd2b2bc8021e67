//! Shared helpers

use std::sync::Arc;
use std::time::Duration;

use maestro::{Agent, InProcessRuntime, ScriptedLlm};

/// Generous deadline for scripted invocations
pub const DEADLINE: Duration = Duration::from_secs(5);

pub fn agent(name: &str, description: &str, llm: &ScriptedLlm) -> Agent {
    Agent::builder(name)
        .with_description(description)
        .with_instructions(format!("You are {name}. {description}"))
        .with_llm(Arc::new(llm.clone()))
        .build()
        .expect("valid agent")
}

pub fn started_runtime() -> InProcessRuntime {
    let runtime = InProcessRuntime::new();
    runtime.start().expect("fresh runtime starts");
    runtime
}
