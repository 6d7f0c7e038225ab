//! Append-only conversation history, buffer commit, and the pure
//! serialization used to replay history back to a provider.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::events::ChannelBuffers;
use crate::types::message::{Message, MessageContent, Role};
use crate::types::usage::{Pricing, TokenUsage};

/// Role on the wire. Providers distinguish exactly two turn roles; every
/// internal role maps onto one of them (or is segregated out entirely, in
/// the case of system instructions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireRole {
    User,
    Assistant,
}

/// One part of a wire message: text or an inline binary payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WirePart {
    Text(String),
    InlineData { mime_type: String, data: String },
}

/// A single turn as replayed to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub parts: Vec<WirePart>,
}

/// Provider-neutral serialization of a conversation: system instructions
/// segregated from the turn list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WirePayload {
    pub system_instruction: Option<String>,
    pub turns: Vec<WireMessage>,
}

impl Message {
    /// Normalize this message into its wire form. System messages return
    /// `None`; they belong in the system-instruction field, not the turn
    /// list. Thinking and tool-call roles compact to the assistant role.
    pub fn to_wire(&self) -> Option<WireMessage> {
        let role = match self.role() {
            Role::System => return None,
            Role::User => WireRole::User,
            Role::Assistant | Role::Thinking | Role::ToolCall => WireRole::Assistant,
        };
        let parts = match &self.content {
            MessageContent::Text(text) => vec![WirePart::Text(text.clone())],
            // Attachments expand into a part list ending with the primary
            // text part.
            MessageContent::Rich { text, attachments } => attachments
                .iter()
                .map(|a| WirePart::InlineData {
                    mime_type: a.mime_type.clone(),
                    data: a.data.clone(),
                })
                .chain(std::iter::once(WirePart::Text(text.clone())))
                .collect(),
            // Structured content is serialized to a JSON string before
            // transmission.
            MessageContent::ToolCall(call) => {
                vec![WirePart::Text(
                    serde_json::to_string(call).unwrap_or_default(),
                )]
            }
        };
        Some(WireMessage { role, parts })
    }
}

/// Ordered, append-only message history plus aggregate metadata.
///
/// A conversation is exclusively owned by one [`Engine`](crate::engine::Engine);
/// snapshots handed out in responses are structural clones, never aliases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
    total_tokens: u64,
    total_cost: f64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Append a message. Ordering is chronological; there is no insertion
    /// in the middle of a history.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Explicitly delete a message by id. Deletion is never a side effect
    /// of sending.
    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id() == id)?;
        Some(self.messages.remove(index))
    }

    /// Point-in-time structural clone of the message list.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Serialize the history for transmission to a provider. Pure and
    /// idempotent: system messages are collected into the system
    /// instruction, every other role is compacted per [`Message::to_wire`].
    pub fn serialize_for_provider(&self) -> WirePayload {
        let mut system_parts: Vec<String> = Vec::new();
        let mut turns = Vec::new();
        for message in &self.messages {
            if message.role() == Role::System {
                system_parts.push(message.content.flat_text());
                continue;
            }
            if let Some(turn) = message.to_wire() {
                turns.push(turn);
            }
        }
        WirePayload {
            system_instruction: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            turns,
        }
    }

    /// Convert accumulated buffers into permanent messages. Called exactly
    /// once per request, on natural stream exhaustion only.
    ///
    /// Commit order is fixed: pending user message, thinking, tool calls,
    /// content. Empty buffers are skipped; the usage buffer is
    /// metadata-only and feeds the aggregates instead of the history.
    pub(crate) fn commit(
        &mut self,
        user: Option<Message>,
        buffers: ChannelBuffers,
        pricing: Option<&Pricing>,
    ) -> usize {
        if let Some(usage) = &buffers.usage {
            self.record_usage(usage, pricing);
        }
        let before = self.messages.len();
        if let Some(user) = user {
            self.messages.push(user);
        }
        if !buffers.thinking.is_empty() {
            self.messages.push(Message::thinking(buffers.thinking));
        }
        for call in buffers.tool_calls {
            if !call.is_empty() {
                self.messages.push(Message::tool_call(call));
            }
        }
        if !buffers.content.is_empty() {
            self.messages.push(Message::assistant(buffers.content));
        }
        let appended = self.messages.len() - before;
        debug!(appended, total = self.messages.len(), "buffers committed");
        appended
    }

    fn record_usage(&mut self, usage: &TokenUsage, pricing: Option<&Pricing>) {
        self.total_tokens += usage.total();
        if let Some(pricing) = pricing {
            self.total_cost += pricing.cost(usage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tool::ToolCall;
    use serde_json::json;

    fn sample() -> Conversation {
        let mut conversation = Conversation::new();
        conversation.push(Message::system("be terse"));
        conversation.push(Message::user("hello"));
        conversation.push(Message::thinking("the user greeted me"));
        conversation.push(Message::assistant("hi"));
        conversation.push(Message::tool_call(ToolCall::new("lookup", json!({}))));
        conversation
    }

    #[test]
    fn system_messages_are_segregated() {
        let payload = sample().serialize_for_provider();
        assert_eq!(payload.system_instruction.as_deref(), Some("be terse"));
        assert_eq!(payload.turns.len(), 4);
    }

    #[test]
    fn internal_roles_compact_to_assistant() {
        let payload = sample().serialize_for_provider();
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
    fn serialization_is_idempotent() {
        let conversation = sample();
        assert_eq!(
            conversation.serialize_for_provider(),
            conversation.serialize_for_provider()
        );
    }

    #[test]
    fn attachments_expand_with_text_last() {
        let mut conversation = Conversation::new();
        conversation.push(Message::new(
            Role::User,
            MessageContent::Rich {
                text: "what is in this image?".to_string(),
                attachments: vec![crate::types::message::Attachment::new("image/png", "AAAA")],
            },
        ));
        let payload = conversation.serialize_for_provider();
        let parts = &payload.turns[0].parts;
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[0], WirePart::InlineData { .. }));
        assert_eq!(
            parts[1],
            WirePart::Text("what is in this image?".to_string())
        );
    }

    #[test]
    fn tool_call_content_is_json_stringified() {
        let mut conversation = Conversation::new();
        conversation.push(Message::tool_call(ToolCall::new("lookup", json!({"q": 1}))));
        let payload = conversation.serialize_for_provider();
        match &payload.turns[0].parts[0] {
            WirePart::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(text).unwrap();
                assert_eq!(value["name"], "lookup");
            }
            other => panic!("expected text part, got {:?}", other),
        }
    }

    #[test]
    fn commit_appends_in_fixed_order_and_skips_empty() {
        let mut conversation = Conversation::new();
        let buffers = ChannelBuffers {
            content: "Hello".to_string(),
            thinking: "reasoning...".to_string(),
            usage: Some(TokenUsage::new(Some(5), Some(7), None)),
            tool_calls: vec![ToolCall::new("lookup", json!({}))],
        };
        let appended = conversation.commit(Some(Message::user("hi")), buffers, None);
        assert_eq!(appended, 4);
        let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role()).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Thinking, Role::ToolCall, Role::Assistant]
        );
        // usage feeds the aggregates, never the history
        assert_eq!(conversation.total_tokens(), 12);
    }

    #[test]
    fn commit_with_empty_buffers_appends_nothing_but_user() {
        let mut conversation = Conversation::new();
        let appended = conversation.commit(
            Some(Message::user("hi")),
            ChannelBuffers::default(),
            None,
        );
        assert_eq!(appended, 1);
        assert_eq!(conversation.message_count(), 1);
    }

    #[test]
    fn remove_is_explicit() {
        let mut conversation = sample();
        let id = conversation.messages()[1].id().to_string();
        let removed = conversation.remove(&id).unwrap();
        assert_eq!(removed.text(), Some("hello"));
        assert_eq!(conversation.message_count(), 4);
        assert!(conversation.remove(&id).is_none());
    }
}
