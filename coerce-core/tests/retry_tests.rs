//! End-to-end retry behaviour against a scripted transport

mod common;

use common::{init_tracing, request, text, tool_call, usage, ScriptedTransport, User};
use coerce_core::protocol::{CompletionUsage, MessageRole};
use coerce_core::retry::TOOL_FAILURE;
use coerce_core::{
    BlockingStructuredClient, ClientConfig, CoerceError, CreateOptions, Mode, PassThrough, Provider,
    RawResponse, SchemaAdapter, StructuredClient, TransportError, ValidationContext,
};
use serde_json::{json, Value};
use std::sync::Arc;

fn openai_config(max_retries: u32) -> ClientConfig {
    ClientConfig::new(Provider::OpenAi)
        .with_model("gpt-4o")
        .with_max_retries(max_retries)
}

#[tokio::test]
async fn test_two_failures_then_success() {
    init_tracing();
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(tool_call("User", r#"{"name": "Jason"}"#)),
        Ok(tool_call("User", r#"{"name": "Jason", "age": "twenty"}"#)),
        Ok(tool_call("User", r#"{"name": "Jason", "age": 25}"#)),
    ]));
    let client = StructuredClient::new(Arc::clone(&transport), openai_config(2)).unwrap();
    let adapter = SchemaAdapter::<User>::new().unwrap();

    let user = client
        .create(&request(), &adapter, CreateOptions::default())
        .await
        .unwrap();

    assert_eq!(user.name, "Jason");
    assert_eq!(user.age, 25);
    assert_eq!(user.usage(), Some(CompletionUsage::new(30, 15, 45)));

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].model.as_deref(), Some("gpt-4o"));

    // Two rounds of assistant, tool marker, correction
    let roles: Vec<MessageRole> = requests[2].messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::Tool,
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::Tool,
            MessageRole::User,
        ]
    );
    assert_eq!(requests[2].messages[2].text(), TOOL_FAILURE);
    assert!(requests[2].messages[3]
        .text()
        .starts_with("Recall the function correctly, fix the errors and exceptions found\n"));
}

#[tokio::test]
async fn test_zero_retries_is_terminal() {
    let transport = Arc::new(ScriptedTransport::new(vec![Ok(tool_call("User", r#"{"name": "Jason"}"#))]));
    let client = StructuredClient::new(Arc::clone(&transport), openai_config(0)).unwrap();
    let adapter = SchemaAdapter::<User>::new().unwrap();

    let err = client
        .create(&request(), &adapter, CreateOptions::default())
        .await
        .unwrap_err();

    assert_eq!(transport.calls(), 1);
    match err {
        CoerceError::RetriesExhausted(terminal) => {
            assert_eq!(terminal.attempts, 1);
            assert_eq!(terminal.total_usage, usage());
            assert!(matches!(
                terminal.last_completion.as_deref(),
                Some(RawResponse::OpenAi(_))
            ));
            assert_eq!(terminal.history.len(), 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_error_is_not_retried() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Err(TransportError::ServerError {
            status_code: 503,
            message: "overloaded".into(),
        }),
        Ok(tool_call("User", r#"{"name": "Jason", "age": 25}"#)),
    ]));
    let client = StructuredClient::new(Arc::clone(&transport), openai_config(3)).unwrap();
    let adapter = SchemaAdapter::<User>::new().unwrap();

    let err = client
        .create(&request(), &adapter, CreateOptions::default())
        .await
        .unwrap_err();

    assert_eq!(transport.calls(), 1);
    assert!(matches!(
        err,
        CoerceError::Transport {
            attempt: 1,
            source: TransportError::ServerError { status_code: 503, .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_precondition_never_reaches_transport() {
    let transport = Arc::new(ScriptedTransport::new(vec![]));
    let config = ClientConfig::new(Provider::Gemini).with_mode(Mode::GeminiJson);
    let client = StructuredClient::new(Arc::clone(&transport), config).unwrap();
    let adapter = SchemaAdapter::<User>::new().unwrap();

    let mut req = request();
    req.model = Some("gemini-1.5-flash".into());
    let err = client.create(&req, &adapter, CreateOptions::default()).await.unwrap_err();

    assert!(matches!(err, CoerceError::Precondition(_)));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_streaming_request_rejected_by_create() {
    let transport = Arc::new(ScriptedTransport::new(vec![]));
    let client = StructuredClient::new(Arc::clone(&transport), openai_config(1)).unwrap();
    let adapter = SchemaAdapter::<User>::new().unwrap();

    let err = client
        .create(&request().with_streaming(false), &adapter, CreateOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CoerceError::Precondition(_)));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_context_validator_failure_is_retried() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(text(r#"{"name": "jason", "age": 25}"#)),
        Ok(text(r#"{"name": "JASON", "age": 25}"#)),
    ]));
    let client = StructuredClient::new(Arc::clone(&transport), openai_config(1)).unwrap();
    let adapter = SchemaAdapter::<User>::new()
        .unwrap()
        .with_validator(|user: &User, ctx: &ValidationContext| {
            let uppercase = ctx.get("uppercase").and_then(Value::as_bool).unwrap_or(false);
            if uppercase && user.name != user.name.to_uppercase() {
                Err("name must be uppercase".to_string())
            } else {
                Ok(())
            }
        });

    let mut ctx = ValidationContext::new();
    ctx.insert("uppercase".into(), json!(true));
    let options = CreateOptions::new()
        .with_mode(Mode::Json)
        .with_validation_context(ctx);

    let user = client.create(&request(), &adapter, options).await.unwrap();

    assert_eq!(user.name, "JASON");
    let last = transport.requests().pop().unwrap();
    assert!(last.messages.last().unwrap().text().contains("name must be uppercase"));
}

#[tokio::test]
async fn test_strict_mode_rejects_string_numbers() {
    let lax = Arc::new(ScriptedTransport::new(vec![Ok(tool_call("User", r#"{"name": "a", "age": "25"}"#))]));
    let client = StructuredClient::new(Arc::clone(&lax), openai_config(0)).unwrap();
    let adapter = SchemaAdapter::<User>::new().unwrap();
    let user = client.create(&request(), &adapter, CreateOptions::default()).await.unwrap();
    assert_eq!(user.age, 25);

    let strict = Arc::new(ScriptedTransport::new(vec![Ok(tool_call("User", r#"{"name": "a", "age": "25"}"#))]));
    let client = StructuredClient::new(Arc::clone(&strict), openai_config(0)).unwrap();
    let err = client
        .create(&request(), &adapter, CreateOptions::new().with_strict(true))
        .await
        .unwrap_err();
    assert!(matches!(err, CoerceError::RetriesExhausted(_)));
}

#[tokio::test]
async fn test_pass_through_returns_raw_response() {
    let transport = Arc::new(ScriptedTransport::new(vec![Ok(text("hello"))]));
    let client = StructuredClient::new(Arc::clone(&transport), openai_config(3)).unwrap();

    let raw = client
        .create(&request(), &PassThrough, CreateOptions::default())
        .await
        .unwrap();

    assert_eq!(raw.text().as_deref(), Some("hello"));
    let sent = transport.requests();
    assert!(sent[0].tools.is_none());
    assert_eq!(sent[0].messages, request().messages);
}

#[tokio::test]
async fn test_caller_request_is_not_mutated() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(tool_call("User", "{")),
        Ok(tool_call("User", r#"{"name": "Jason", "age": 25}"#)),
    ]));
    let client = StructuredClient::new(Arc::clone(&transport), openai_config(1)).unwrap();
    let adapter = SchemaAdapter::<User>::new().unwrap();

    let original = request();
    let snapshot = original.clone();
    client.create(&original, &adapter, CreateOptions::default()).await.unwrap();

    assert_eq!(original, snapshot);
}

#[test]
fn test_blocking_client_mirrors_async_client() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(tool_call("User", r#"{"name": "Jason"}"#)),
        Ok(tool_call("User", r#"{"name": "Jason", "age": 25}"#)),
    ]));
    let client = BlockingStructuredClient::new(Arc::clone(&transport), openai_config(1)).unwrap();
    let adapter = SchemaAdapter::<User>::new().unwrap();

    let user = client.create(&request(), &adapter, CreateOptions::default()).unwrap();

    assert_eq!(user.age, 25);
    assert_eq!(user.usage(), Some(CompletionUsage::new(20, 10, 30)));
    assert_eq!(transport.calls(), 2);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = ClientConfig::new(Provider::Anthropic).with_mode(Mode::Tools);
    let err = BlockingStructuredClient::new(ScriptedTransport::default(), config).unwrap_err();
    assert!(matches!(err, CoerceError::Config(_)));
}
