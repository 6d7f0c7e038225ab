//! Core data model: messages, streaming events, tool calls, token usage.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Message`] | Conversation entry with an immutable role |
//! | [`Role`] | Message role (user, assistant, system, thinking, tool_call) |
//! | [`StreamEvent`] | Per-chunk channel delta, plus the final buffer snapshot |
//! | [`Channel`] | Named logical sub-stream of a response |
//! | [`ChannelBuffers`] | Accumulated per-channel buffers for one request |
//! | [`ToolCall`] | Function/tool invocation requested by the model |
//! | [`TokenUsage`] | Token counts reported by the provider |

pub mod events;
pub mod message;
pub mod tool;
pub mod usage;

pub use events::{Channel, ChannelBuffers, StreamEvent};
pub use message::{Attachment, Message, MessageContent, Role};
pub use tool::{ToolCall, ToolDefinition};
pub use usage::{Pricing, TokenUsage};
