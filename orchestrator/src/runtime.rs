//! In-process runtime
//!
//! Owns the tasks that drive invocations and the tasks that run agent calls,
//! and tracks whether any of them are still outstanding.
//!
//! State machine: `Created -> Running -> Idle <-> Running -> Stopped`.

use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use maestro_agent::{Agent, History, Message};

use crate::error::{OrchestrationError, Result};

/// Observable runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    /// Constructed, not yet started
    Created,
    /// Started with outstanding work
    Running,
    /// Started with nothing outstanding
    Idle,
    /// Stopped; new work is rejected
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Started,
    Stopped,
}

struct Inner {
    lifecycle: Mutex<Lifecycle>,
    outstanding: watch::Sender<usize>,
}

/// Process-wide dispatcher for orchestration work
///
/// Cloning yields another handle to the same runtime.
#[derive(Clone)]
pub struct InProcessRuntime {
    inner: Arc<Inner>,
}

impl Default for InProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InProcessRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessRuntime")
            .field("status", &self.status())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Keeps one unit of work counted until dropped
pub(crate) struct WorkGuard {
    inner: Arc<Inner>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.inner.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl InProcessRuntime {
    /// Create a runtime in the `Created` state
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                lifecycle: Mutex::new(Lifecycle::Created),
                outstanding,
            }),
        }
    }

    fn lifecycle(&self) -> Lifecycle {
        *self.inner.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition to running
    ///
    /// Fails with `AlreadyStarted` if the runtime was started (or stopped) before.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        match *lifecycle {
            Lifecycle::Created => {
                *lifecycle = Lifecycle::Started;
                tracing::debug!("Runtime started");
                Ok(())
            }
            Lifecycle::Started | Lifecycle::Stopped => Err(OrchestrationError::AlreadyStarted),
        }
    }

    /// Stop accepting work; in-flight tasks run to completion
    pub fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if *lifecycle != Lifecycle::Stopped {
            *lifecycle = Lifecycle::Stopped;
            tracing::debug!(outstanding = self.outstanding(), "Runtime stopped");
        }
    }

    /// Wait until no invocation or agent call is outstanding
    pub async fn run_until_idle(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        // The sender lives as long as `self`, so this only returns on idle
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Current state
    pub fn status(&self) -> RuntimeStatus {
        match self.lifecycle() {
            Lifecycle::Created => RuntimeStatus::Created,
            Lifecycle::Stopped => RuntimeStatus::Stopped,
            Lifecycle::Started if self.outstanding() == 0 => RuntimeStatus::Idle,
            Lifecycle::Started => RuntimeStatus::Running,
        }
    }

    /// Number of invocations and agent calls still running
    pub fn outstanding(&self) -> usize {
        *self.inner.outstanding.borrow()
    }

    /// Count one unit of work, rejecting it unless the runtime is started
    pub(crate) fn track(&self) -> Result<WorkGuard> {
        // Hold the lifecycle lock so stop() cannot slip in between check and count
        let lifecycle = self.inner.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        match *lifecycle {
            Lifecycle::Created => Err(OrchestrationError::RuntimeNotStarted),
            Lifecycle::Stopped => Err(OrchestrationError::RuntimeStopped),
            Lifecycle::Started => {
                self.inner.outstanding.send_modify(|n| *n += 1);
                Ok(WorkGuard {
                    inner: Arc::clone(&self.inner),
                })
            }
        }
    }

    /// Spawn a tracked task
    pub(crate) fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.track()?;
        Ok(tokio::spawn(async move {
            let _guard = guard;
            future.await
        }))
    }

    /// Run one agent turn on a tracked task
    ///
    /// The call keeps running (and stays counted) even if the caller stops
    /// waiting for it.
    pub fn dispatch(
        &self,
        agent: &Agent,
        history: History,
        extra_instructions: Option<String>,
    ) -> Result<JoinHandle<anyhow::Result<Message>>> {
        let agent = agent.clone();
        self.spawn(async move { agent.invoke_with(&history, extra_instructions.as_deref()).await })
    }
}
