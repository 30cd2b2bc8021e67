//! Ordering, isolation and termination guarantees

use std::sync::{Arc, Mutex};
use std::time::Duration;

use maestro::{
    event_channel, AgentRegistryConfig, CeilingPolicy, ConcurrentOrchestration, GroupChatManager,
    GroupChatOrchestration, HandoffOrchestration, IllegalHandoffPolicy, KeywordApproval,
    LastMessageBy, MagenticOrchestration, Orchestration, OrchestrationError, OrchestrationEvent,
    OrchestrationHandoffs, ResponseCallback, ScriptedLlm, SequentialOrchestration,
    StandardMagenticManager,
};

use crate::common::{agent, started_runtime, DEADLINE};

#[tokio::test]
async fn test_concurrent_every_agent_sees_only_the_input() {
    let budget = ScriptedLlm::constant("- day pass\n- free museums");
    let food = ScriptedLlm::constant("- schnitzel");
    let culture = ScriptedLlm::constant("- opera");
    let fan_out = ConcurrentOrchestration::new(vec![
        agent("BudgetExpert", "Finds savings", &budget),
        agent("FoodExpert", "Finds food", &food),
        agent("CultureExpert", "Finds culture", &culture),
    ])
    .unwrap();

    let runtime = started_runtime();
    let handle = fan_out.invoke("Three days in Vienna", &runtime).await.unwrap();
    let responses = handle.get_value(DEADLINE).await.unwrap();

    for llm in [&budget, &food, &culture] {
        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request.messages.len(), 1);
    }

    let authors: Vec<_> = responses.iter().map(|m| m.agent_name().unwrap()).collect();
    assert_eq!(authors, ["BudgetExpert", "FoodExpert", "CultureExpert"]);
}

#[tokio::test]
async fn test_concurrent_single_participant_sees_only_the_input() {
    let solo = ScriptedLlm::constant("- opera");
    let fan_out =
        ConcurrentOrchestration::new(vec![agent("CultureExpert", "Finds culture", &solo)]).unwrap();

    let runtime = started_runtime();
    let handle = fan_out.invoke("Three days in Vienna", &runtime).await.unwrap();
    let responses = handle.get_value(DEADLINE).await.unwrap();

    assert_eq!(responses.len(), 1);
    let requests = solo.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].request.messages.len(), 1);
}

#[tokio::test]
async fn test_concurrent_slow_branch_times_out_without_partial_result() {
    let fast = ScriptedLlm::constant("- schnitzel");
    let slow = ScriptedLlm::constant("- opera").with_latency(Duration::from_millis(300));
    let fan_out = ConcurrentOrchestration::new(vec![
        agent("FoodExpert", "Finds food", &fast),
        agent("CultureExpert", "Finds culture", &slow),
    ])
    .unwrap();

    let runtime = started_runtime();
    let handle = fan_out.invoke("Three days in Vienna", &runtime).await.unwrap();
    let err = handle.get_value(Duration::from_millis(50)).await.unwrap_err();
    assert!(matches!(err, OrchestrationError::InvocationTimeout { .. }));

    // The fast branch finished, but the handle never exposes it
    runtime.run_until_idle().await;
    assert_eq!(fast.call_count(), 1);
    assert_eq!(handle.get_value(DEADLINE).await.unwrap_err(), err);
}

#[tokio::test]
async fn test_sequential_agent_n_sees_n_minus_one_outputs() {
    let llms: Vec<ScriptedLlm> = ["analysis", "draft", "final copy"]
        .into_iter()
        .map(ScriptedLlm::constant)
        .collect();
    let pipeline = SequentialOrchestration::new(vec![
        agent("Analyst", "Extracts features", &llms[0]),
        agent("Writer", "Writes copy", &llms[1]),
        agent("Editor", "Polishes copy", &llms[2]),
    ])
    .unwrap();

    let runtime = started_runtime();
    let handle = pipeline.invoke("Insulated water bottle", &runtime).await.unwrap();
    assert_eq!(handle.get_value(DEADLINE).await.unwrap(), "final copy");

    for (n, llm) in llms.iter().enumerate() {
        // Input plus every earlier agent's output
        assert_eq!(llm.requests()[0].request.messages.len(), n + 1);
    }
}

#[tokio::test]
async fn test_sequential_events_arrive_in_turn_order() {
    let (tx, mut rx) = event_channel();
    let a = ScriptedLlm::constant("a");
    let b = ScriptedLlm::constant("b");
    let pipeline = SequentialOrchestration::new(vec![agent("A", "", &a), agent("B", "", &b)])
        .unwrap()
        .with_response_callback(ResponseCallback::from_sender(tx));

    let runtime = started_runtime();
    let handle = pipeline.invoke("go", &runtime).await.unwrap();
    handle.get_value(DEADLINE).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(match event {
            OrchestrationEvent::InvocationStarted { .. } => "started".to_string(),
            OrchestrationEvent::AgentResponse { turn, message, .. } => {
                format!("{}:{}", turn, message.agent_name().unwrap())
            }
            OrchestrationEvent::InvocationCompleted { turns, .. } => format!("completed:{turns}"),
            other => panic!("unexpected event {other:?}"),
        });
    }
    assert_eq!(kinds, ["started", "1:A", "2:B", "completed:2"]);
}

#[tokio::test]
async fn test_group_chat_cycles_and_stops_at_ceiling() {
    let strategist = ScriptedLlm::constant("angle");
    let copywriter = ScriptedLlm::constant("slogan");
    let editor = ScriptedLlm::constant("notes");
    let spoken = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&spoken);

    let chat = GroupChatOrchestration::new(
        GroupChatManager::round_robin(10),
        vec![
            agent("Strategist", "Finds the angle", &strategist),
            agent("Copywriter", "Writes slogans", &copywriter),
            agent("Editor", "Reviews slogans", &editor),
        ],
    )
    .unwrap()
    .with_response_callback(ResponseCallback::new(move |m| {
        log.lock().unwrap().push(m.agent_name().unwrap().to_string());
    }));

    let runtime = started_runtime();
    let handle = chat.invoke("Slogan for an electric SUV", &runtime).await.unwrap();
    handle.get_value(DEADLINE).await.unwrap();

    let spoken = spoken.lock().unwrap().clone();
    let expected: Vec<&str> = ["Strategist", "Copywriter", "Editor"]
        .iter()
        .cycle()
        .take(10)
        .copied()
        .collect();
    assert_eq!(spoken, expected);
    assert_eq!(strategist.call_count(), 4);
    assert_eq!(editor.call_count(), 3);
}

#[tokio::test]
async fn test_group_chat_approval_returns_newest_draft() {
    let copywriter = ScriptedLlm::new(["Drive the future", "Silence is powerful"]);
    let reviewer = ScriptedLlm::new(["Too generic", "This one is approved"]);

    let chat = GroupChatOrchestration::new(
        GroupChatManager::round_robin(10)
            .with_termination(KeywordApproval::new("Reviewer", "approve"))
            .with_filter(LastMessageBy::new("Copywriter")),
        vec![
            agent("Copywriter", "Writes slogans", &copywriter),
            agent("Reviewer", "Approves slogans", &reviewer),
        ],
    )
    .unwrap();

    let runtime = started_runtime();
    let handle = chat.invoke("Slogan for an electric SUV", &runtime).await.unwrap();
    assert_eq!(handle.get_value(DEADLINE).await.unwrap(), "Silence is powerful");
}

#[tokio::test]
async fn test_group_chat_approval_stops_on_that_turn() {
    // Round-robin over [Strategist, Editor, Copywriter] puts the editor on
    // turns 2, 5 and 8 and the strategist on turns 1, 4 and 7
    let strategist = ScriptedLlm::new(["angle 1", "angle 2", "angle 3"]);
    let editor = ScriptedLlm::new(["needs work", "closer", "APPROVED, ship it"]);
    let copywriter = ScriptedLlm::constant("draft");
    let (tx, mut rx) = event_channel();

    let chat = GroupChatOrchestration::new(
        GroupChatManager::round_robin(10)
            .with_termination(KeywordApproval::new("Editor", "approved"))
            .with_filter(LastMessageBy::new("Strategist")),
        vec![
            agent("Strategist", "Finds the angle", &strategist),
            agent("Editor", "Reviews slogans", &editor),
            agent("Copywriter", "Writes slogans", &copywriter),
        ],
    )
    .unwrap()
    .with_response_callback(ResponseCallback::from_sender(tx));

    let runtime = started_runtime();
    let handle = chat.invoke("Slogan for an electric SUV", &runtime).await.unwrap();
    assert_eq!(handle.get_value(DEADLINE).await.unwrap(), "angle 3");

    let mut last_turn = 0;
    while let Ok(event) = rx.try_recv() {
        if let OrchestrationEvent::AgentResponse { turn, .. } = event {
            last_turn = turn;
        }
    }
    assert_eq!(last_turn, 8);
    assert_eq!(copywriter.call_count(), 2);
}

const SUPPORT_DESK: &str = r#"
[[agents]]
name = "FrontDesk"
description = "Routes customer requests"
instructions = "Route the customer to the right specialist."
can_handoff_to = ["TechSupport", "BillingSupport"]

[[agents]]
name = "TechSupport"
description = "Fixes technical issues"
instructions = "Fix technical problems."
can_handoff_to = ["FrontDesk"]

[[agents]]
name = "BillingSupport"
description = "Handles invoices and refunds"
instructions = "Handle billing."
can_handoff_to = ["FrontDesk"]
"#;

fn support_desk(
    front: &ScriptedLlm,
    tech: &ScriptedLlm,
    billing: &ScriptedLlm,
    policy: IllegalHandoffPolicy,
) -> HandoffOrchestration {
    let registry = AgentRegistryConfig::from_toml(SUPPORT_DESK)
        .unwrap()
        .into_registry()
        .unwrap();
    let agents = registry
        .build_agents_with(&["FrontDesk", "TechSupport", "BillingSupport"], |config| {
            let llm = match config.name.as_str() {
                "FrontDesk" => front,
                "TechSupport" => tech,
                _ => billing,
            };
            Arc::new(llm.clone())
        })
        .unwrap();

    HandoffOrchestration::new(registry.handoffs("FrontDesk").unwrap(), agents)
        .unwrap()
        .with_illegal_handoff_policy(policy)
}

#[tokio::test]
async fn test_handoff_billing_cannot_reach_tech() {
    let front = ScriptedLlm::new(["HANDOFF: BillingSupport"]);
    let tech = ScriptedLlm::constant("tech answer");
    let billing = ScriptedLlm::new(["HANDOFF: TechSupport"]);
    let desk = support_desk(&front, &tech, &billing, IllegalHandoffPolicy::Fail);

    let runtime = started_runtime();
    let handle = desk.invoke("Charged twice and my router is down", &runtime).await.unwrap();
    let err = handle.get_value(DEADLINE).await.unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::IllegalHandoff { ref from, ref to, .. }
            if from == "BillingSupport" && to == "TechSupport"
    ));
    assert_eq!(tech.call_count(), 0);
}

#[tokio::test]
async fn test_handoff_billing_can_go_back_to_front_desk() {
    let front = ScriptedLlm::new([
        "HANDOFF: BillingSupport",
        "That part is technical.\nHANDOFF: TechSupport",
    ]);
    let tech = ScriptedLlm::new(["Restart the router; it is fixed."]);
    let billing = ScriptedLlm::new(["Refund issued. The rest is technical.\nHANDOFF: FrontDesk"]);
    let desk = support_desk(&front, &tech, &billing, IllegalHandoffPolicy::RetainTurn);

    let runtime = started_runtime();
    let handle = desk.invoke("Charged twice and my router is down", &runtime).await.unwrap();
    let result = handle.get_value(DEADLINE).await.unwrap();

    assert_eq!(result, "Restart the router; it is fixed.");
    assert_eq!(front.call_count(), 2);
    assert_eq!(billing.call_count(), 1);
}

#[tokio::test]
async fn test_handoff_ignores_directives_inside_reasoning() {
    let front = ScriptedLlm::new(["HANDOFF: BillingSupport"]);
    let tech = ScriptedLlm::constant("tech answer");
    let billing = ScriptedLlm::new([
        "<think>\nThe router sounds technical.\nHANDOFF: TechSupport\n</think>\nRefund issued for the double charge.",
    ]);
    let desk = support_desk(&front, &tech, &billing, IllegalHandoffPolicy::Fail);

    let runtime = started_runtime();
    let handle = desk.invoke("Charged twice", &runtime).await.unwrap();

    assert_eq!(
        handle.get_value(DEADLINE).await.unwrap(),
        "Refund issued for the double charge."
    );
    assert_eq!(tech.call_count(), 0);
}

#[tokio::test]
async fn test_magentic_fails_exactly_at_ceiling() {
    // A planner that always delegates and never declares completion
    let manager = ScriptedLlm::constant(
        r#"{"is_complete": false, "next_speaker": "Researcher", "instruction": "Dig deeper"}"#,
    );
    let researcher = ScriptedLlm::constant("more findings");
    let magentic = MagenticOrchestration::new(
        StandardMagenticManager::new(Arc::new(manager.clone())),
        vec![agent("Researcher", "Finds facts", &researcher)],
    )
    .unwrap();

    let runtime = started_runtime();
    let handle = magentic.invoke("Energy use of ResNet-50 training", &runtime).await.unwrap();
    let err = handle.get_value(DEADLINE).await.unwrap_err();

    assert_eq!(
        err,
        OrchestrationError::MaxInvocationsExceeded {
            pattern: "magentic".into(),
            limit: 15,
        }
    );
    assert_eq!(researcher.call_count(), 15);
    assert_eq!(manager.call_count(), 15);
}

#[tokio::test]
async fn test_magentic_partial_result_policy() {
    let manager = ScriptedLlm::constant(r#"{"is_complete": false, "next_speaker": "Coder"}"#);
    let coder = ScriptedLlm::new(["v1", "v2"]);
    let magentic = MagenticOrchestration::new(
        StandardMagenticManager::new(Arc::new(manager)),
        vec![agent("Coder", "Writes code", &coder)],
    )
    .unwrap()
    .with_maximum_invocation_count(2)
    .with_ceiling_policy(CeilingPolicy::ReturnPartial);

    let runtime = started_runtime();
    let handle = magentic.invoke("Write a benchmark", &runtime).await.unwrap();
    assert_eq!(handle.get_value(DEADLINE).await.unwrap(), "v2");
}
