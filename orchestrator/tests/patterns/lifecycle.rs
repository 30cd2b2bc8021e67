//! Runtime states, handle timeouts and idempotent reads

use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use maestro::{
    event_channel, InProcessRuntime, Orchestration, OrchestrationError, ResponseCallback,
    RuntimeStatus, ScriptedLlm, SequentialOrchestration,
};

use crate::common::{agent, started_runtime, DEADLINE};

#[tokio::test]
async fn test_invoke_requires_started_runtime() {
    let llm = ScriptedLlm::constant("ok");
    let (tx, mut rx) = event_channel();
    let pipeline = SequentialOrchestration::new(vec![agent("A", "", &llm)])
        .unwrap()
        .with_response_callback(ResponseCallback::from_sender(tx));

    let runtime = InProcessRuntime::new();
    let err = assert_err!(pipeline.invoke("x", &runtime).await);
    assert_eq!(err, OrchestrationError::RuntimeNotStarted);

    runtime.start().unwrap();
    runtime.stop();
    let err = assert_err!(pipeline.invoke("x", &runtime).await);
    assert_eq!(err, OrchestrationError::RuntimeStopped);
    assert!(err.is_lifecycle());
    assert_eq!(llm.call_count(), 0);

    // Rejected invocations never report a start
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_runtime_goes_idle_after_invocation() {
    let llm = ScriptedLlm::constant("ok").with_latency(Duration::from_millis(30));
    let pipeline = SequentialOrchestration::new(vec![agent("A", "", &llm)]).unwrap();

    let runtime = started_runtime();
    let handle = pipeline.invoke("x", &runtime).await.unwrap();
    assert_eq!(runtime.status(), RuntimeStatus::Running);

    runtime.run_until_idle().await;
    assert_eq!(runtime.status(), RuntimeStatus::Idle);
    assert_ok!(handle.get_value(Duration::from_millis(1)).await);

    runtime.stop();
    assert_eq!(runtime.status(), RuntimeStatus::Stopped);
}

#[tokio::test]
async fn test_second_read_does_not_rerun_agents() {
    let llm = ScriptedLlm::new(["only once"]);
    let pipeline = SequentialOrchestration::new(vec![agent("A", "", &llm)]).unwrap();

    let runtime = started_runtime();
    let handle = pipeline.invoke("x", &runtime).await.unwrap();

    let first = handle.get_value(DEADLINE).await.unwrap();
    let second = handle.get_value(DEADLINE).await.unwrap();
    assert_eq!(first, "only once");
    assert_eq!(first, second);
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn test_timeout_is_sticky() {
    let llm = ScriptedLlm::constant("late").with_latency(Duration::from_millis(300));
    let pipeline = SequentialOrchestration::new(vec![agent("Slow", "", &llm)]).unwrap();

    let runtime = started_runtime();
    let handle = pipeline.invoke("x", &runtime).await.unwrap();

    let err = assert_err!(handle.get_value(Duration::from_millis(20)).await);
    assert!(matches!(err, OrchestrationError::InvocationTimeout { .. }));

    // The in-flight agent call still finishes on the runtime
    runtime.run_until_idle().await;
    assert_eq!(llm.call_count(), 1);

    let again = assert_err!(handle.get_value(DEADLINE).await);
    assert_eq!(err, again);
}

#[tokio::test]
async fn test_handle_reports_invocation_info() {
    let llm = ScriptedLlm::constant("ok");
    let pipeline =
        SequentialOrchestration::new(vec![agent("A", "", &llm), agent("B", "", &llm)]).unwrap();

    let runtime = started_runtime();
    let first = pipeline.invoke("x", &runtime).await.unwrap();
    let second = pipeline.invoke("y", &runtime).await.unwrap();

    assert_eq!(first.info().pattern, "sequential");
    assert_eq!(first.info().participants, ["A", "B"]);
    assert_ne!(first.info().id, second.info().id);

    assert_ok!(first.get_value(DEADLINE).await);
    assert_ok!(second.get_value(DEADLINE).await);
}
