//! Invocation handle: the eventual result of one orchestration run

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::error::{OrchestrationError, Result};

/// Metadata captured when an invocation starts
#[derive(Debug, Clone, Serialize)]
pub struct InvocationInfo {
    pub id: Uuid,
    pub pattern: String,
    pub started_at: DateTime<Utc>,
    /// Participant names at invoke time
    pub participants: Vec<String>,
}

impl InvocationInfo {
    pub fn new(pattern: impl Into<String>, participants: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pattern: pattern.into(),
            started_at: Utc::now(),
            participants,
        }
    }
}

/// Future-like handle resolved exactly once
///
/// The driver publishes its result on a watch channel, so any number of
/// readers can wait at the same time, each against its own deadline. The
/// first outcome any reader observes (value, failure or timeout) is stored
/// and returned to every later read; nothing is recomputed and no agent is
/// called twice.
pub struct InvocationHandle<T> {
    info: InvocationInfo,
    receiver: watch::Receiver<Option<Result<T>>>,
    resolved: Mutex<Option<Result<T>>>,
    abort: AbortHandle,
}

impl<T> std::fmt::Debug for InvocationHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationHandle")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl<T: Clone> InvocationHandle<T> {
    pub(crate) fn new(
        info: InvocationInfo,
        receiver: watch::Receiver<Option<Result<T>>>,
        abort: AbortHandle,
    ) -> Self {
        Self {
            info,
            receiver,
            resolved: Mutex::new(None),
            abort,
        }
    }

    pub fn info(&self) -> &InvocationInfo {
        &self.info
    }

    fn stored(&self) -> Option<Result<T>> {
        self.resolved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Record an outcome unless another reader got there first
    fn settle(&self, outcome: Result<T>) -> Result<T> {
        self.resolved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_or_insert(outcome)
            .clone()
    }

    /// Wait up to `timeout` for the result
    ///
    /// On expiry the driver task is aborted (best-effort: agent calls already
    /// handed to the runtime finish in the background) and the handle resolves
    /// to `InvocationTimeout` for every later read, including readers that were
    /// already waiting with a longer deadline.
    pub async fn get_value(&self, timeout: Duration) -> Result<T> {
        if let Some(result) = self.stored() {
            return result;
        }

        let mut receiver = self.receiver.clone();
        let published = tokio::time::timeout(timeout, async {
            receiver
                .wait_for(Option::is_some)
                .await
                .map(|value| (*value).clone())
        })
        .await;

        let outcome = match published {
            Ok(Ok(Some(result))) => result,
            // Sender dropped without a value: driver panicked or was aborted
            Ok(Ok(None)) | Ok(Err(_)) => Err(OrchestrationError::Cancelled {
                pattern: self.info.pattern.clone(),
            }),
            Err(_) => {
                tracing::warn!(
                    pattern = %self.info.pattern,
                    invocation = %self.info.id,
                    ?timeout,
                    "Invocation timed out"
                );
                // Settle before aborting so waiting readers never see a bare cancel
                let result = self.settle(Err(OrchestrationError::InvocationTimeout {
                    pattern: self.info.pattern.clone(),
                    timeout,
                }));
                self.abort.abort();
                return result;
            }
        };

        self.settle(outcome)
    }

    /// True once a read has resolved the handle
    pub fn is_resolved(&self) -> bool {
        self.resolved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Abort the driver task without waiting for a result
    pub fn cancel(&self) {
        self.abort.abort();
    }
}
