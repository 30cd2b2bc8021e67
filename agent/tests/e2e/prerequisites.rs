//! Verify E2E test prerequisites before running tests

use maestro_agent::llm::list_models;

/// Ollama URL, overridable with OLLAMA_URL
pub fn ollama_url() -> String {
    std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string())
}

/// Model to use, overridable with OLLAMA_MODEL
pub fn ollama_model() -> String {
    std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.1:8b".to_string())
}

/// Check if Ollama is running and the model is available
pub async fn check_ollama() -> bool {
    let model = ollama_model();
    match list_models(&ollama_url()).await {
        Ok(models) => models.iter().any(|m| m.name == model || m.name.starts_with(&model)),
        Err(_) => false,
    }
}

#[tokio::test]
#[ignore = "prerequisites check - run first"]
async fn test_prerequisites() {
    let ollama_ok = check_ollama().await;
    assert!(
        ollama_ok,
        "Ollama not reachable at {} or model {} not pulled. Start with: ollama serve",
        ollama_url(),
        ollama_model()
    );
}
