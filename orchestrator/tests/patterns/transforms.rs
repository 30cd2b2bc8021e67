//! Typed results through result transforms

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;

use maestro::{
    ConcurrentOrchestration, Orchestration, OrchestrationError, ScriptedLlm, SectionTransform,
    SequentialOrchestration, StructuredOutputTransform,
};

use crate::common::{agent, started_runtime, DEADLINE};

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
struct TravelAnalysis {
    budget_insights: Vec<String>,
    food_experiences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
struct Slogan {
    text: String,
    tone: String,
}

#[tokio::test]
async fn test_concurrent_sections_become_fields() {
    let budget = ScriptedLlm::constant("Tips:\n- 72h transit pass\n- free Sunday museums");
    let food = ScriptedLlm::constant("1. Naschmarkt\n2. Sachertorte");
    let fan_out = ConcurrentOrchestration::new(vec![
        agent("BudgetExpert", "Finds savings", &budget),
        agent("FoodExpert", "Finds food", &food),
    ])
    .unwrap()
    .with_result_transform(
        SectionTransform::<TravelAnalysis>::new()
            .field("BudgetExpert", "budget_insights")
            .field("FoodExpert", "food_experiences"),
    );

    let runtime = started_runtime();
    let handle = fan_out.invoke("Vienna on a budget", &runtime).await.unwrap();
    let analysis = handle.get_value(DEADLINE).await.unwrap();

    assert_eq!(
        analysis.budget_insights,
        ["72h transit pass", "free Sunday museums"]
    );
    assert_eq!(analysis.food_experiences, ["Naschmarkt", "Sachertorte"]);
}

#[tokio::test]
async fn test_structured_output_from_pipeline() {
    let writer = ScriptedLlm::constant("Quiet power. Tone: confident");
    let coercer = ScriptedLlm::constant(r#"{"text": "Quiet power.", "tone": "confident"}"#);
    let pipeline = SequentialOrchestration::new(vec![agent("Writer", "Writes slogans", &writer)])
        .unwrap()
        .with_result_transform(StructuredOutputTransform::<Slogan>::new(Arc::new(
            coercer.clone(),
        )));

    let runtime = started_runtime();
    let handle = pipeline.invoke("Slogan for an electric SUV", &runtime).await.unwrap();
    let slogan = handle.get_value(DEADLINE).await.unwrap();

    assert_eq!(
        slogan,
        Slogan {
            text: "Quiet power.".into(),
            tone: "confident".into(),
        }
    );
    let sent = &coercer.requests()[0].request.messages[0].content;
    assert_eq!(sent, "Quiet power. Tone: confident");
}

#[tokio::test]
async fn test_shape_mismatch_is_transform_error() {
    let writer = ScriptedLlm::constant("Quiet power.");
    let coercer = ScriptedLlm::constant(r#"{"text": "Quiet power."}"#);
    let pipeline = SequentialOrchestration::new(vec![agent("Writer", "Writes slogans", &writer)])
        .unwrap()
        .with_result_transform(StructuredOutputTransform::<Slogan>::new(Arc::new(coercer)));

    let runtime = started_runtime();
    let handle = pipeline.invoke("Slogan", &runtime).await.unwrap();
    let err = handle.get_value(DEADLINE).await.unwrap_err();

    match err {
        OrchestrationError::Transform { pattern, reason } => {
            assert_eq!(pattern, "sequential");
            assert!(reason.contains("tone"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
