//! Tool-loop behaviour of `Gateway::chat`.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{MODEL, PROVIDER, backend, call, gateway, new_session, session_len, text_reply, tool_reply};
use conduit_domain::{ChatRequest, GatewayError};
use conduit_llm::{
    ContentBlock, ErrorKind, FinishReason, Generation, Role, StreamCallback, StreamEvent, Usage,
    options,
};
use conduit_session::{GeneratorMeta, SessionUpdate};
use conduit_tools::{MockTool, ToolOutput, Toolkit};

fn meta() -> GeneratorMeta {
    GeneratorMeta::new(MODEL)
}

#[tokio::test]
async fn test_plain_reply_is_persisted() {
    let backend = Arc::new(backend().with_responses(vec![text_reply("hello there")]));
    let gateway = gateway(backend.clone(), Toolkit::new());
    let id = new_session(&gateway, meta()).await;

    let response = gateway.chat(ChatRequest::new(id, "hi"), None).await.unwrap();

    assert_eq!(response.text(), "hello there");
    assert_eq!(response.role, Role::Assistant);
    assert_eq!(response.result, FinishReason::Ok);
    assert_eq!(response.session_id, id);
    assert_eq!(response.usage, Usage::new(30, 4));

    let session = gateway.get_session(&id).await.unwrap();
    let roles: Vec<Role> = session.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
    assert!(session.modified >= session.created);
}

#[tokio::test]
async fn test_history_is_sent_with_each_turn() {
    let backend = Arc::new(
        backend().with_responses(vec![text_reply("first"), text_reply("second")]),
    );
    let gateway = gateway(backend.clone(), Toolkit::new());
    let id = new_session(&gateway, meta()).await;

    gateway.chat(ChatRequest::new(id, "one"), None).await.unwrap();
    gateway.chat(ChatRequest::new(id, "two"), None).await.unwrap();

    let requests = backend.requests();
    assert!(requests[0].history.is_empty());
    assert_eq!(requests[1].history.len(), 2);
    assert_eq!(requests[1].history[1].text(), "first");
    assert_eq!(requests[1].message.text(), "two");
    assert_eq!(session_len(&gateway, &id).await, 4);
}

#[tokio::test]
async fn test_tool_results_are_fed_back_in_call_order() {
    let slow = Arc::new(
        MockTool::new("slow")
            .with_delay(Duration::from_millis(200))
            .with_response(ToolOutput::text("slow done")),
    );
    let fast = Arc::new(MockTool::new("fast").with_response(ToolOutput::text("fast done")));

    let backend = Arc::new(backend().with_responses(vec![
        tool_reply(vec![
            call("c1", "slow", json!({})),
            call("c2", "fast", json!({})),
            call("c3", "slow", json!({"again": true})),
        ]),
        text_reply("all done"),
    ]));
    let gateway = gateway(
        backend.clone(),
        Toolkit::new().with_tool(slow.clone()).with_tool(fast.clone()),
    );
    let id = new_session(&gateway, meta()).await;

    let started = Instant::now();
    let response = gateway.chat(ChatRequest::new(id, "go"), None).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(390));

    assert_eq!(response.text(), "all done");
    assert_eq!(response.usage, Usage::new(50, 9));
    assert_eq!(slow.call_count(), 2);
    assert_eq!(fast.call_count(), 1);

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    let results = &requests[1].message;
    assert_eq!(results.role, Role::Tool);
    let ids: Vec<&str> = results
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::ToolResult(result) => result.call_id.as_str(),
            other => panic!("unexpected block: {other:?}"),
        })
        .collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);

    let session = gateway.get_session(&id).await.unwrap();
    let roles: Vec<Role> = session.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
}

#[tokio::test]
async fn test_tool_failures_do_not_abort_the_loop() {
    let broken = Arc::new(MockTool::new("broken").failing("disk full"));
    let backend = Arc::new(backend().with_responses(vec![
        tool_reply(vec![
            call("c1", "broken", json!({})),
            call("c2", "invented", json!({})),
        ]),
        text_reply("recovered"),
    ]));
    let gateway = gateway(backend.clone(), Toolkit::new().with_tool(broken));
    let id = new_session(&gateway, meta()).await;

    let response = gateway.chat(ChatRequest::new(id, "go"), None).await.unwrap();
    assert_eq!(response.text(), "recovered");

    let results = &backend.requests()[1].message;
    for block in &results.content {
        match block {
            ContentBlock::ToolResult(result) => assert!(result.is_error()),
            other => panic!("unexpected block: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_budget_exhaustion_takes_exactly_limit_plus_one_calls() {
    let echo = Arc::new(MockTool::new("echo"));
    let backend = Arc::new(
        backend()
            .with_responses(vec![text_reply("warm up")])
            .repeating(tool_reply(vec![call("c", "echo", json!({}))])),
    );
    let gateway = gateway(backend.clone(), Toolkit::new().with_tool(echo.clone()));
    let id = new_session(&gateway, meta()).await;

    gateway.chat(ChatRequest::new(id, "hello"), None).await.unwrap();
    let before = session_len(&gateway, &id).await;
    let calls_before = backend.request_count();

    let err = gateway
        .chat(ChatRequest::new(id, "loop forever").with_max_iterations(3), None)
        .await
        .unwrap_err();

    match &err {
        GatewayError::MaxIterations { limit, message } => {
            assert_eq!(*limit, 3);
            assert_eq!(message.result, FinishReason::MaxIterations);
            assert!(message.has_tool_calls());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(backend.request_count() - calls_before, 4);
    assert_eq!(echo.call_count(), 3);
    assert_eq!(session_len(&gateway, &id).await, before);
}

#[tokio::test]
async fn test_default_budget_applies() {
    let backend = Arc::new(backend().repeating(tool_reply(vec![call("c", "echo", json!({}))])));
    let gateway = gateway(backend.clone(), Toolkit::new().with_tool(Arc::new(MockTool::new("echo"))));
    let id = new_session(&gateway, meta()).await;

    let err = gateway.chat(ChatRequest::new(id, "go"), None).await.unwrap_err();
    assert!(matches!(err, GatewayError::MaxIterations { limit: 10, .. }));
    assert_eq!(backend.request_count(), 11);
    assert_eq!(session_len(&gateway, &id).await, 0);
}

#[tokio::test]
async fn test_empty_toolkit_returns_tool_call_message() {
    let backend = Arc::new(
        backend().with_responses(vec![tool_reply(vec![call("c1", "search", json!({"q": "x"}))])]),
    );
    let gateway = gateway(backend.clone(), Toolkit::new());
    let id = new_session(&gateway, meta()).await;

    let response = gateway.chat(ChatRequest::new(id, "find x"), None).await.unwrap();

    assert_eq!(backend.request_count(), 1);
    assert_eq!(response.result, FinishReason::ToolCall);
    assert!(matches!(
        response.content.as_slice(),
        [ContentBlock::ToolCall(c)] if c.id == "c1" && c.name == "search"
    ));
    assert_eq!(session_len(&gateway, &id).await, 2);
}

#[tokio::test]
async fn test_overhead_from_last_call() {
    let backend = Arc::new(backend().with_responses(vec![
        Generation::text("ok", Usage::new(120, 3)),
        Generation::text("ok", Usage::new(1, 3)),
    ]));
    let gateway = gateway(backend, Toolkit::new());
    let id = new_session(&gateway, meta()).await;

    gateway.chat(ChatRequest::new(id, "abcdefgh"), None).await.unwrap();
    let session = gateway.get_session(&id).await.unwrap();
    // The user message is estimated at two tokens.
    assert_eq!(session.overhead, 118);

    gateway.chat(ChatRequest::new(id, "abcdefgh"), None).await.unwrap();
    let session = gateway.get_session(&id).await.unwrap();
    assert_eq!(session.overhead, 118);
}

#[tokio::test]
async fn test_cancellation_rolls_back() {
    let sleepy = Arc::new(MockTool::new("sleepy").with_delay(Duration::from_secs(30)));
    let backend = Arc::new(
        backend().with_responses(vec![tool_reply(vec![call("c", "sleepy", json!({}))])]),
    );
    let gateway = gateway(backend.clone(), Toolkit::new().with_tool(sleepy));
    let id = new_session(&gateway, meta()).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = gateway
        .chat(ChatRequest::new(id, "wait").with_cancellation(cancel), None)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(backend.request_count(), 1);
    assert_eq!(session_len(&gateway, &id).await, 0);
}

#[tokio::test]
async fn test_unknown_restricted_tool_fails_fast() {
    let backend = Arc::new(backend().with_responses(vec![text_reply("never")]));
    let gateway = gateway(backend.clone(), Toolkit::new().with_tool(Arc::new(MockTool::new("echo"))));
    let id = new_session(&gateway, meta()).await;

    let err = gateway
        .chat(ChatRequest::new(id, "go").with_tools(["echo", "missing"]), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(backend.request_count(), 0);
    assert_eq!(session_len(&gateway, &id).await, 0);
}

#[tokio::test]
async fn test_restriction_limits_offered_tools() {
    let backend = Arc::new(backend().with_responses(vec![text_reply("ok")]));
    let toolkit = Toolkit::new()
        .with_tool(Arc::new(MockTool::new("echo")))
        .with_tool(Arc::new(MockTool::new("shell")));
    let gateway = gateway(backend.clone(), toolkit);
    let id = new_session(&gateway, meta()).await;

    gateway
        .chat(ChatRequest::new(id, "go").with_tools(["echo"]), None)
        .await
        .unwrap();

    let offered: Vec<String> = backend.requests()[0]
        .options
        .tools()
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(offered, vec!["echo"]);
}

#[tokio::test]
async fn test_stream_sees_tool_calls_then_text() {
    let backend = Arc::new(backend().with_responses(vec![
        tool_reply(vec![call("c1", "echo", json!({}))]),
        text_reply("done"),
    ]));
    let gateway = gateway(backend, Toolkit::new().with_tool(Arc::new(MockTool::new("echo"))));
    let id = new_session(&gateway, meta()).await;

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let callback: StreamCallback = Arc::new(move |event| sink.lock().push(event));

    gateway
        .chat(ChatRequest::new(id, "go"), Some(callback))
        .await
        .unwrap();

    let events = events.lock().clone();
    assert!(matches!(events.first(), Some(StreamEvent::ToolCall(c)) if c.id == "c1"));
    assert_eq!(events.last(), Some(&StreamEvent::TextDelta("done".to_string())));
}

#[tokio::test]
async fn test_request_overrides_are_not_persisted() {
    let backend = Arc::new(backend().with_responses(vec![text_reply("ok")]));
    let gateway = gateway(backend.clone(), Toolkit::new());
    let id = new_session(&gateway, meta().with_system_prompt("Be terse.")).await;

    gateway
        .chat(
            ChatRequest::new(id, "go")
                .with_meta(GeneratorMeta::default().with_system_prompt("Use French."))
                .with_option(options::temperature(0.7)),
            None,
        )
        .await
        .unwrap();

    let sent = &backend.requests()[0].options;
    assert_eq!(sent.system_prompt(), Some("Be terse.\n\nUse French."));
    assert_eq!(sent.temperature(), Some(0.7));

    let session = gateway.get_session(&id).await.unwrap();
    assert_eq!(session.meta.system_prompt, "Be terse.");
    assert_eq!(session.meta.provider, PROVIDER);
}

#[tokio::test]
async fn test_backend_error_leaves_session_untouched() {
    let backend = Arc::new(
        backend().with_results(vec![conduit_llm::MockResponse::Error("overloaded".to_string())]),
    );
    let gateway = gateway(backend, Toolkit::new());
    let id = new_session(&gateway, meta()).await;

    let err = gateway.chat(ChatRequest::new(id, "hi"), None).await.unwrap_err();
    assert!(matches!(err, GatewayError::Llm(_)));
    assert_eq!(session_len(&gateway, &id).await, 0);
}

#[tokio::test]
async fn test_update_during_chat_is_kept() {
    let slow = Arc::new(MockTool::new("slow").with_delay(Duration::from_millis(200)));
    let backend = Arc::new(backend().with_responses(vec![
        tool_reply(vec![call("c1", "slow", json!({}))]),
        text_reply("done"),
    ]));
    let gateway = gateway(backend, Toolkit::new().with_tool(slow));
    let id = new_session(&gateway, meta()).await;

    let chatting = gateway.clone();
    let chat = tokio::spawn(async move { chatting.chat(ChatRequest::new(id, "go"), None).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    gateway
        .update_session(&id, SessionUpdate::new().with_name("renamed").with_label("k", "v"))
        .await
        .unwrap();

    chat.await.unwrap().unwrap();

    let session = gateway.get_session(&id).await.unwrap();
    assert_eq!(session.name, "renamed");
    assert_eq!(session.labels.get("k").map(String::as_str), Some("v"));
    assert_eq!(session.messages.len(), 4);
}
