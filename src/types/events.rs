//! Streaming events and per-channel buffers.

use serde::{Deserialize, Serialize};

use super::tool::ToolCall;
use super::usage::TokenUsage;

/// A named logical sub-stream within a single response transport.
///
/// Each channel has a fixed accumulation rule: text channels concatenate,
/// the usage channel is last-write-wins, the tool-call channel appends
/// elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Content,
    Thinking,
    Usage,
    ToolCalls,
}

impl Channel {
    /// Fixed registration order; events for one chunk are emitted in this
    /// order before the next chunk is read.
    pub const ORDER: [Channel; 4] = [
        Channel::Content,
        Channel::Thinking,
        Channel::Usage,
        Channel::ToolCalls,
    ];
}

/// One streaming event: a per-chunk **delta** on a single channel, or the
/// final buffer snapshot emitted once on natural exhaustion.
///
/// Consumers decide whether to render deltas live or to wait for the
/// reconciled result; the two views are always consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Content { text: String },
    Thinking { text: String },
    Usage { usage: TokenUsage },
    ToolCalls { calls: Vec<ToolCall> },
    Buffers { buffers: ChannelBuffers },
}

impl StreamEvent {
    /// The channel this event belongs to; `None` for the final snapshot.
    pub fn channel(&self) -> Option<Channel> {
        match self {
            StreamEvent::Content { .. } => Some(Channel::Content),
            StreamEvent::Thinking { .. } => Some(Channel::Thinking),
            StreamEvent::Usage { .. } => Some(Channel::Usage),
            StreamEvent::ToolCalls { .. } => Some(Channel::ToolCalls),
            StreamEvent::Buffers { .. } => None,
        }
    }
}

/// Accumulated per-channel buffers for one request lifecycle.
///
/// Buffer growth is monotonic: text buffers only grow, the usage buffer is
/// only replaced by newer data, the tool-call list only appends.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelBuffers {
    pub content: String,
    pub thinking: String,
    pub usage: Option<TokenUsage>,
    pub tool_calls: Vec<ToolCall>,
}

impl ChannelBuffers {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
            && self.thinking.is_empty()
            && self.usage.is_none()
            && self.tool_calls.is_empty()
    }
}
