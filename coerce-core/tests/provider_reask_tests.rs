//! Re-ask turns on the native protocols, driven through the async client

mod common;

use common::{
    anthropic_tool_use, cohere_text, gemini_function_call, gemini_text, init_tracing, request,
    ScriptedTransport, User,
};
use coerce_core::protocol::{ContentPart, MessageContent, MessageRole};
use coerce_core::retry::TOOL_FAILURE;
use coerce_core::{ClientConfig, CompletionUsage, CreateOptions, Provider, SchemaAdapter, StructuredClient};
use serde_json::{json, Value};
use std::sync::Arc;

const CORRECTION_PREFIX: &str = "Recall the function correctly, fix the errors and exceptions found\n";

async fn run(config: ClientConfig, transport: &Arc<ScriptedTransport>) -> coerce_core::Structured<User> {
    init_tracing();
    let client = StructuredClient::new(Arc::clone(transport), config.with_max_retries(1)).unwrap();
    let adapter = SchemaAdapter::<User>::new().unwrap();
    client
        .create(&request(), &adapter, CreateOptions::default())
        .await
        .unwrap()
}

fn contents(value: &Value) -> &Vec<Value> {
    value["contents"].as_array().unwrap()
}

#[tokio::test]
async fn test_anthropic_tools_reask() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(anthropic_tool_use("User", json!({"name": "Jason"}))),
        Ok(anthropic_tool_use("User", json!({"name": "Jason", "age": 25}))),
    ]));
    let config = ClientConfig::new(Provider::Anthropic).with_model("claude-3-5-sonnet");

    let user = run(config, &transport).await;

    assert_eq!(user.age, 25);
    assert_eq!(user.usage(), Some(CompletionUsage::new(20, 10, 30)));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].messages.len(), 1);

    let second = &requests[1].messages;
    let roles: Vec<MessageRole> = second.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]);

    let MessageContent::Parts(replayed) = &second[1].content else {
        panic!("assistant turn should replay content blocks");
    };
    assert!(matches!(
        &replayed[..],
        [ContentPart::ToolUse { id, name, input }]
            if id == "toolu_1" && name == "User" && input == &json!({"name": "Jason"})
    ));

    // Tool result and correction travel in the same user turn
    let MessageContent::Parts(answer) = &second[2].content else {
        panic!("user turn should carry parts");
    };
    assert_eq!(answer.len(), 2);
    assert!(matches!(
        &answer[0],
        ContentPart::ToolResult { tool_use_id, content, is_error: true }
            if tool_use_id == "toolu_1" && content == TOOL_FAILURE
    ));
    assert!(matches!(&answer[1], ContentPart::Text { text } if text.starts_with(CORRECTION_PREFIX)));
}

#[tokio::test]
async fn test_gemini_json_reask() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(gemini_text(r#"{"name": "Jason"}"#)),
        Ok(gemini_text(r#"{"name": "Jason", "age": 25}"#)),
    ]));

    let user = run(ClientConfig::new(Provider::Gemini), &transport).await;

    assert_eq!(user.name, "Jason");
    assert_eq!(user.usage(), Some(CompletionUsage::new(20, 10, 30)));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].model.is_none());
    assert!(requests[1].messages.is_empty());
    assert_eq!(contents(&Value::Object(requests[0].extra.clone())).len(), 1);

    let extra = Value::Object(requests[1].extra.clone());
    let turns = contents(&extra);
    let roles: Vec<&str> = turns.iter().map(|t| t["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["user", "model", "user"]);
    assert_eq!(turns[1]["parts"][0]["text"], r#"{"name": "Jason"}"#);
    assert!(turns[2]["parts"][0]["text"]
        .as_str()
        .unwrap()
        .starts_with(CORRECTION_PREFIX));
    assert_eq!(extra["generation_config"]["response_mime_type"], "application/json");
}

#[tokio::test]
async fn test_vertexai_tools_reask() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(gemini_function_call("User", json!({"name": "Jason"}))),
        Ok(gemini_function_call("User", json!({"name": "Jason", "age": 25}))),
    ]));
    let config = ClientConfig::new(Provider::VertexAi).with_model("gemini-1.5-pro");

    let user = run(config, &transport).await;

    assert_eq!(user.age, 25);
    assert_eq!(user.usage(), Some(CompletionUsage::new(20, 10, 30)));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].model.as_deref(), Some("gemini-1.5-pro"));

    let extra = Value::Object(requests[1].extra.clone());
    let turns = contents(&extra);
    let roles: Vec<&str> = turns.iter().map(|t| t["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["user", "model", "user"]);
    assert_eq!(turns[1]["parts"][0]["function_call"]["args"], json!({"name": "Jason"}));

    let response = &turns[2]["parts"][0]["function_response"];
    assert_eq!(response["name"], "User");
    assert!(response["response"]["content"]
        .as_str()
        .unwrap()
        .starts_with("Validation Error found:\n"));
}

#[tokio::test]
async fn test_cohere_tools_reask() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(cohere_text(r#"{"name": "Jason"}"#)),
        Ok(cohere_text(r#"{"name": "Jason", "age": 25}"#)),
    ]));
    let config = ClientConfig::new(Provider::Cohere).with_model("command-r-plus");

    let user = run(config, &transport).await;

    assert_eq!(user.age, 25);
    assert_eq!(user.usage(), Some(CompletionUsage::new(20, 10, 30)));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);

    let first = &requests[0].extra;
    assert_eq!(
        first["chat_history"],
        json!([{"role": "USER", "message": "Extract: Jason is 25 years old"}])
    );
    let instruction = first["message"].as_str().unwrap();
    assert!(instruction.starts_with("Extract a valid User object"));

    // The instruction and the failed reply move into history
    let second = &requests[1].extra;
    assert_eq!(
        second["chat_history"],
        json!([
            {"role": "USER", "message": "Extract: Jason is 25 years old"},
            {"role": "USER", "message": instruction},
            {"role": "CHATBOT", "message": r#"{"name": "Jason"}"#}
        ])
    );
    assert!(second["message"].as_str().unwrap().starts_with(CORRECTION_PREFIX));
}
