//! Single agent turns over a real model

use std::sync::Arc;

use maestro_agent::{Agent, History, Message, OllamaClient};

use crate::prerequisites::{check_ollama, ollama_model, ollama_url};

fn agent(name: &str, instructions: &str) -> Agent {
    Agent::builder(name)
        .with_instructions(instructions)
        .with_temperature(0.0)
        .with_llm(Arc::new(OllamaClient::new(&ollama_url(), &ollama_model())))
        .build()
        .expect("valid agent")
}

#[tokio::test]
#[ignore = "requires Ollama"]
async fn test_agent_replies_to_input() {
    if !check_ollama().await {
        eprintln!("Skipping: Ollama not available");
        return;
    }

    let echo = agent("Echo", "Repeat the user's message back in uppercase and nothing else.");
    let reply = echo
        .invoke(&History::with_input("hello"))
        .await
        .expect("completion succeeds");

    assert_eq!(reply.agent_name(), Some("Echo"));
    assert!(reply.text().to_uppercase().contains("HELLO"));
}

#[tokio::test]
#[ignore = "requires Ollama"]
async fn test_agent_sees_other_agents() {
    if !check_ollama().await {
        eprintln!("Skipping: Ollama not available");
        return;
    }

    let mut history = History::with_input("What number did the Counter say?");
    history.push(Message::from_agent("Counter", "42"));

    let reader = agent("Reader", "Answer with the number only.");
    let reply = reader.invoke(&history).await.expect("completion succeeds");
    assert!(reply.text().contains("42"));
}
