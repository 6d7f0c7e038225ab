//! Stream demultiplexer: per-chunk channel extraction and accumulation.
//!
//! [`ChannelDemux`] is push-based: the caller feeds decoded provider
//! chunks and receives the events each chunk produced; the accumulated
//! buffers are surrendered once, by value, when the stream is exhausted.
//! Driving it from an async stream is the orchestrator's job.

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::adapter::ProviderAdapter;
use crate::types::events::{ChannelBuffers, StreamEvent};

/// Post-processing applied to the content buffer at exhaustion, before the
/// buffer is committed (e.g., stripping a provider's markup wrapper).
pub type ContentParser = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Demultiplexes one response stream into its logical channels.
///
/// Per chunk, the adapter's extractors run in the fixed registration order
/// content, thinking, usage, tool_calls. A falsy extraction (empty string,
/// empty list, `None`) produces no event and no buffer mutation; a chunk
/// for which every extractor is falsy produces nothing at all and the
/// stream continues.
pub struct ChannelDemux {
    adapter: Arc<dyn ProviderAdapter>,
    buffers: ChannelBuffers,
    content_parser: Option<ContentParser>,
}

impl ChannelDemux {
    pub fn new(adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            adapter,
            buffers: ChannelBuffers::default(),
            content_parser: None,
        }
    }

    pub fn with_content_parser(
        mut self,
        parser: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.content_parser = Some(Box::new(parser));
        self
    }

    /// Consume one chunk: update buffers and return the events it produced,
    /// in registration order. Events carry the **delta**, not the
    /// accumulated buffer.
    pub fn feed(&mut self, chunk: &Value) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        let text = self.adapter.parse_content(chunk);
        if !text.is_empty() {
            self.buffers.content.push_str(&text);
            events.push(StreamEvent::Content { text });
        }

        let text = self.adapter.parse_thinking(chunk);
        if !text.is_empty() {
            self.buffers.thinking.push_str(&text);
            events.push(StreamEvent::Thinking { text });
        }

        if let Some(usage) = self.adapter.parse_token_usage(chunk) {
            // last-write-wins: replacement, not merge
            self.buffers.usage = Some(usage);
            events.push(StreamEvent::Usage { usage });
        }

        let calls = self.adapter.parse_tool_calls(chunk);
        if !calls.is_empty() {
            self.buffers.tool_calls.extend(calls.iter().cloned());
            events.push(StreamEvent::ToolCalls { calls });
        }

        if events.is_empty() {
            trace!("chunk produced no channel values");
        }
        events
    }

    /// Current buffer state, for inspection while the stream is in flight.
    pub fn buffers(&self) -> &ChannelBuffers {
        &self.buffers
    }

    /// Surrender the accumulated buffers, applying the content parser.
    ///
    /// Consumes the demux: the buffer set for a request can be taken
    /// exactly once, which is what makes the downstream commit
    /// exactly-once by construction.
    pub fn finish(mut self) -> ChannelBuffers {
        if let Some(parser) = &self.content_parser {
            self.buffers.content = parser(&self.buffers.content);
        }
        self.buffers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ChatOptions, ChatRequest};
    use crate::types::events::Channel;
    use crate::types::tool::ToolCall;
    use crate::types::usage::TokenUsage;
    use crate::Result;
    use serde_json::json;
    use url::Url;

    /// Adapter over the abstract chunk shape
    /// `{content, thinking, usage, tool_calls}` used throughout the demux
    /// tests.
    struct FlatAdapter;

    impl ProviderAdapter for FlatAdapter {
        fn service_id(&self) -> &str {
            "flat"
        }

        fn build_wire_request(&self, _request: &ChatRequest) -> Result<Value> {
            Ok(json!({}))
        }

        fn chat_url(&self, _options: &ChatOptions, _credential: Option<&str>) -> Result<Url> {
            Ok(Url::parse("http://localhost/chat").unwrap())
        }

        fn streaming_chat_url(
            &self,
            _options: &ChatOptions,
            _credential: Option<&str>,
        ) -> Result<Url> {
            Ok(Url::parse("http://localhost/stream").unwrap())
        }

        fn parse_content(&self, chunk: &Value) -> String {
            chunk
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        }

        fn parse_thinking(&self, chunk: &Value) -> String {
            chunk
                .get("thinking")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        }

        fn parse_token_usage(&self, chunk: &Value) -> Option<TokenUsage> {
            let usage = chunk.get("usage")?;
            Some(TokenUsage::new(
                usage.get("input_tokens").and_then(Value::as_u64),
                usage.get("output_tokens").and_then(Value::as_u64),
                None,
            ))
        }

        fn parse_tool_calls(&self, chunk: &Value) -> Vec<ToolCall> {
            chunk
                .get("tool_calls")
                .and_then(Value::as_array)
                .map(|calls| {
                    calls
                        .iter()
                        .filter_map(|call| {
                            Some(ToolCall::new(
                                call.get("name").and_then(Value::as_str)?,
                                call.get("input").cloned().unwrap_or_else(|| json!({})),
                            ))
                        })
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    fn demux() -> ChannelDemux {
        ChannelDemux::new(Arc::new(FlatAdapter))
    }

    #[test]
    fn content_deltas_concatenate() {
        let mut demux = demux();
        for delta in ["Hel", "lo", ", world"] {
            demux.feed(&json!({ "content": delta }));
        }
        assert_eq!(demux.buffers().content, "Hello, world");
    }

    #[test]
    fn interleaved_channels_accumulate_per_rule() {
        // the concrete scenario: content deltas, thinking, one tool call
        let mut demux = demux();
        let chunks = [
            json!({ "content": "Hel" }),
            json!({ "content": "lo" }),
            json!({ "thinking": "reasoning..." }),
            json!({ "tool_calls": [{ "name": "lookup", "input": {} }] }),
        ];
        for chunk in &chunks {
            demux.feed(chunk);
        }
        let buffers = demux.finish();
        assert_eq!(buffers.content, "Hello");
        assert_eq!(buffers.thinking, "reasoning...");
        assert_eq!(buffers.tool_calls, vec![ToolCall::new("lookup", json!({}))]);
        assert!(buffers.usage.is_none());
    }

    #[test]
    fn usage_is_last_write_wins() {
        let mut demux = demux();
        demux.feed(&json!({ "usage": { "input_tokens": 1, "output_tokens": 1 } }));
        demux.feed(&json!({ "usage": { "input_tokens": 7, "output_tokens": 35 } }));
        let usage = demux.buffers().usage.unwrap();
        assert_eq!(usage.input_tokens, Some(7));
        assert_eq!(usage.total(), 42);
    }

    #[test]
    fn all_falsy_chunk_produces_nothing_and_changes_nothing() {
        let mut demux = demux();
        demux.feed(&json!({ "content": "Hi" }));
        let before = demux.buffers().clone();
        let events = demux.feed(&json!({ "unrelated": true, "content": "" }));
        assert!(events.is_empty());
        assert_eq!(demux.buffers(), &before);
        // the stream is not terminated: later chunks still land
        demux.feed(&json!({ "content": "!" }));
        assert_eq!(demux.buffers().content, "Hi!");
    }

    #[test]
    fn events_for_one_chunk_follow_registration_order() {
        let mut demux = demux();
        let events = demux.feed(&json!({
            "tool_calls": [{ "name": "lookup", "input": {} }],
            "usage": { "input_tokens": 1, "output_tokens": 2 },
            "thinking": "hm",
            "content": "Hi",
        }));
        let channels: Vec<Channel> = events.iter().filter_map(StreamEvent::channel).collect();
        assert_eq!(channels, Channel::ORDER.to_vec());
    }

    #[test]
    fn events_carry_deltas_not_buffers() {
        let mut demux = demux();
        demux.feed(&json!({ "content": "Hel" }));
        let events = demux.feed(&json!({ "content": "lo" }));
        assert_eq!(events, vec![StreamEvent::Content { text: "lo".to_string() }]);
    }

    #[test]
    fn content_parser_applies_at_finish_only() {
        let mut demux = demux().with_content_parser(|text| text.trim().to_string());
        demux.feed(&json!({ "content": "  Hello  " }));
        assert_eq!(demux.buffers().content, "  Hello  ");
        assert_eq!(demux.finish().content, "Hello");
    }
}
