//! Ollama LLM implementation

use anyhow::{Context, Result};
use async_trait::async_trait;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    models::ModelOptions,
    Ollama,
};
use serde::{Deserialize, Serialize};

use super::{ChatRequest, Llm, Role};

const FALLBACK_URL: &str = "http://localhost:11434";

/// Information about an available model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: u64,
    pub modified_at: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<ModelInfo>,
}

fn parse_url(raw: &str) -> url::Url {
    url::Url::parse(raw).unwrap_or_else(|_| {
        tracing::warn!("Invalid Ollama URL {:?}, falling back to {}", raw, FALLBACK_URL);
        url::Url::parse(FALLBACK_URL).expect("fallback URL is valid")
    })
}

/// List available models from Ollama
pub async fn list_models(ollama_url: &str) -> Result<Vec<ModelInfo>> {
    let url = parse_url(ollama_url);
    let api_url = url.join("api/tags").context("building tags URL")?;

    let client = reqwest::Client::new();
    let response: OllamaTagsResponse = client.get(api_url).send().await?.json().await?;

    Ok(response.models)
}

/// Ollama client wrapper
pub struct OllamaClient {
    client: Ollama,
    model: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(url: &str, model: &str) -> Self {
        let url = parse_url(url);

        let host = url.host_str().unwrap_or("localhost").to_string();
        let port = url.port().unwrap_or(11434);

        Self {
            client: Ollama::new(format!("{}://{}", url.scheme(), host), port),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Llm for OllamaClient {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        let messages: Vec<ChatMessage> = request
            .full_messages()
            .into_iter()
            .map(|m| match m.role {
                Role::System => ChatMessage::system(m.content),
                Role::User => ChatMessage::user(m.content),
                Role::Assistant => ChatMessage::assistant(m.content),
            })
            .collect();

        let chat_request = ChatMessageRequest::new(self.model.clone(), messages)
            .options(ModelOptions::default().temperature(request.temperature));

        let response = self
            .client
            .send_chat_messages(chat_request)
            .await
            .with_context(|| format!("Ollama chat request failed for model {}", self.model))?;

        Ok(response.message.content)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
