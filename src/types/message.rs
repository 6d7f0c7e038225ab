//! Conversation messages with role-based entries and multi-part content.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::tool::ToolCall;

/// Message role. Internal-only roles (`Thinking`, `ToolCall`) exist in the
/// history but are compacted to the provider's assistant-equivalent role
/// when a conversation is serialized for transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Thinking,
    ToolCall,
}

/// Inline binary payload embedded in a message (base64 + MIME type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    /// Base64-encoded payload.
    pub data: String,
}

impl Attachment {
    pub fn new(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Encode raw bytes as an inline attachment.
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// Message content: plain text, a structured tool-call descriptor, or text
/// with embedded attachments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    ToolCall(ToolCall),
    Rich {
        text: String,
        attachments: Vec<Attachment>,
    },
}

impl MessageContent {
    /// The primary text of this content. Structured content is rendered as
    /// its JSON form, the same normalization used on the wire.
    pub fn flat_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Rich { text, .. } => text.clone(),
            MessageContent::ToolCall(call) => serde_json::to_string(call).unwrap_or_default(),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<ToolCall> for MessageContent {
    fn from(call: ToolCall) -> Self {
        MessageContent::ToolCall(call)
    }
}

/// A conversation entry. The role is immutable after creation; content is
/// frozen once the stream that produced it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content,
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content.into())
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(text.into()))
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, MessageContent::Text(text.into()))
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        Self::new(Role::Thinking, MessageContent::Text(text.into()))
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self::new(Role::ToolCall, MessageContent::ToolCall(call))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The text content, if this is a plain-text message.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_assign_roles_and_ids() {
        let a = Message::user("hi");
        let b = Message::assistant("hello");
        assert_eq!(a.role(), Role::User);
        assert_eq!(b.role(), Role::Assistant);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn flat_text_renders_tool_calls_as_json() {
        let call = ToolCall::new("lookup", json!({"q": "rust"}));
        let content = MessageContent::ToolCall(call);
        let flat = content.flat_text();
        assert!(flat.contains("\"lookup\""));
        assert!(flat.contains("\"q\""));
    }

    #[test]
    fn attachment_from_bytes_base64_encodes() {
        let att = Attachment::from_bytes("image/png", b"png-bytes");
        assert_eq!(att.mime_type, "image/png");
        assert_eq!(att.data, "cG5nLWJ5dGVz");
    }
}
