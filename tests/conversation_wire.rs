//! Serialization round-trip properties over the public API: role
//! compaction, system segregation, idempotence.

use chat_engine_rust::{
    Attachment, ChatOptions, ChatRequest, Conversation, GeminiAdapter, Message, MessageContent,
    ProviderAdapter, Role, ToolCall, WireRole,
};
use serde_json::json;

fn sample_conversation() -> Conversation {
    let mut conversation = Conversation::new();
    conversation.push(Message::system("answer in one sentence"));
    conversation.push(Message::user("what is SSE?"));
    conversation.push(Message::thinking("the user asks about streaming"));
    conversation.push(Message::tool_call(ToolCall::new(
        "lookup",
        json!({"q": "server-sent events"}),
    )));
    conversation.push(Message::assistant("A one-way streaming format."));
    conversation
}

#[test]
fn serialize_twice_yields_identical_payloads() {
    let conversation = sample_conversation();
    let first = conversation.serialize_for_provider();
    let second = conversation.serialize_for_provider();
    assert_eq!(first, second);
}

#[test]
fn internal_roles_reach_the_wire_as_the_assistant_role() {
    let payload = sample_conversation().serialize_for_provider();
    // system is segregated, the four remaining turns compact to two roles
    assert_eq!(
        payload.system_instruction.as_deref(),
        Some("answer in one sentence")
    );
    let roles: Vec<WireRole> = payload.turns.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![
            WireRole::User,
            WireRole::Assistant,
            WireRole::Assistant,
            WireRole::Assistant
        ]
    );
}

#[test]
fn gemini_request_round_trip_is_deterministic() {
    let adapter = GeminiAdapter::new();
    let conversation = sample_conversation();
    let payload = conversation.serialize_for_provider();
    let request = ChatRequest {
        options: ChatOptions::new("gemini-2.0-flash"),
        system_instruction: payload.system_instruction.clone(),
        turns: payload.turns.clone(),
    };

    let first = adapter.build_wire_request(&request).unwrap();
    let second = adapter.build_wire_request(&request).unwrap();
    assert_eq!(first, second);

    assert_eq!(first["system_instruction"]["parts"][0]["text"], "answer in one sentence");
    let roles: Vec<&str> = first["contents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "model", "model", "model"]);
}

#[test]
fn attachments_become_inline_data_parts_with_text_last() {
    let adapter = GeminiAdapter::new();
    let mut conversation = Conversation::new();
    conversation.push(Message::new(
        Role::User,
        MessageContent::Rich {
            text: "describe this".to_string(),
            attachments: vec![Attachment::from_bytes("image/png", b"fake-png")],
        },
    ));
    let payload = conversation.serialize_for_provider();
    let request = ChatRequest {
        options: ChatOptions::new("gemini-2.0-flash"),
        system_instruction: None,
        turns: payload.turns,
    };
    let body = adapter.build_wire_request(&request).unwrap();
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0]["inline_data"]["mime_type"], "image/png");
    assert_eq!(parts[1]["text"], "describe this");
}
