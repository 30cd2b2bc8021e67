//! Behavioral tests for the orchestration patterns
//!
//! Every agent runs on a `ScriptedLlm`, so these tests need no model server.
//!
//! Test structure:
//! - common: agent and runtime helpers
//! - properties: ordering, isolation and termination guarantees per pattern
//! - lifecycle: runtime states, handle timeouts and idempotent reads
//! - transforms: typed results through result transforms

#[path = "patterns/common.rs"]
mod common;

#[path = "patterns/properties.rs"]
mod properties;

#[path = "patterns/lifecycle.rs"]
mod lifecycle;

#[path = "patterns/transforms.rs"]
mod transforms;
