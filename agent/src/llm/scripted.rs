//! Deterministic in-memory LLM backend
//!
//! Returns queued replies (or the output of a responder closure) without any
//! network traffic, and records every request it receives. Useful for tests
//! and for running orchestrations offline.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{ChatRequest, Llm};

type Responder = Arc<dyn Fn(&ChatRequest) -> Result<String> + Send + Sync>;

/// A request observed by a [`ScriptedLlm`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Zero-based call index
    pub index: usize,
    pub request: ChatRequest,
}

enum Script {
    Queue(VecDeque<Result<String, String>>),
    Responder(Responder),
}

/// Scripted LLM that replays canned responses
#[derive(Clone)]
pub struct ScriptedLlm {
    model: String,
    script: Arc<Mutex<Script>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    latency: Duration,
}

impl ScriptedLlm {
    /// Reply with each string in order, then fail
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = replies.into_iter().map(|r| Ok(r.into())).collect();
        Self::with_script(Script::Queue(queue))
    }

    /// Compute every reply from the incoming request
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self::with_script(Script::Responder(Arc::new(responder)))
    }

    /// Always reply with the same text
    pub fn constant(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::from_fn(move |_| Ok(reply.clone()))
    }

    /// Fail every call with the given message
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::from_fn(move |_| Err(anyhow!("{}", message)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            model: "scripted".to_string(),
            script: Arc::new(Mutex::new(script)),
            requests: Arc::new(Mutex::new(Vec::new())),
            latency: Duration::ZERO,
        }
    }

    /// Set the reported model name
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sleep before answering, to simulate a network round trip
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue one more reply (queue scripts only)
    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Script::Queue(queue) = &mut *self.script.lock().unwrap_or_else(|e| e.into_inner()) {
            queue.push_back(Ok(reply.into()));
        }
    }

    /// Queue a failure (queue scripts only)
    pub fn push_error(&self, message: impl Into<String>) {
        if let Script::Queue(queue) = &mut *self.script.lock().unwrap_or_else(|e| e.into_inner()) {
            queue.push_back(Err(message.into()));
        }
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn next_reply(&self, request: &ChatRequest) -> Result<String> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *script {
            Script::Queue(queue) => match queue.pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(anyhow!("{}", message)),
                None => Err(anyhow!("scripted model {} has no replies left", self.model)),
            },
            Script::Responder(responder) => responder(request),
        }
    }
}

#[async_trait]
impl Llm for ScriptedLlm {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        {
            let mut requests = self.requests.lock().unwrap_or_else(|e| e.into_inner());
            let index = requests.len();
            requests.push(RecordedRequest {
                index,
                request: request.clone(),
            });
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.next_reply(request)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;

    fn request(text: &str) -> ChatRequest {
        ChatRequest::new(vec![Message::user(text)], 0.5)
    }

    #[tokio::test]
    async fn test_replays_queue_then_fails() {
        let llm = ScriptedLlm::new(["one", "two"]);

        assert_eq!(llm.chat(&request("a")).await.unwrap(), "one");
        assert_eq!(llm.chat(&request("b")).await.unwrap(), "two");
        assert!(llm.chat(&request("c")).await.is_err());
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_records_requests() {
        let llm = ScriptedLlm::constant("ok");
        llm.chat(&request("hello")).await.unwrap();

        let recorded = llm.requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].index, 0);
        assert_eq!(recorded[0].request.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn test_push_error() {
        let llm = ScriptedLlm::new(["first"]);
        llm.push_error("rate limited");

        assert!(llm.chat(&request("a")).await.is_ok());
        let err = llm.chat(&request("b")).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_from_fn_sees_request() {
        let llm = ScriptedLlm::from_fn(|req| Ok(format!("{} turns", req.messages.len())));
        assert_eq!(llm.chat(&request("x")).await.unwrap(), "1 turns");
    }
}
