//! Provider adapter contract and registry.
//!
//! An adapter is a capability set, not an inheritance hierarchy: one
//! required request builder plus per-channel parse functions that return
//! falsy values on missing data. Adapters hold no per-request state and are
//! shareable across engines.

pub mod gemini;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::conversation::WireMessage;
use crate::error::ErrorContext;
use crate::types::tool::{ToolCall, ToolDefinition};
use crate::types::usage::TokenUsage;
use crate::{Error, Result};

/// Framing of the provider's streaming response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Server-sent events: `data: {json}` frames separated by blank lines.
    Sse,
    /// One JSON object per line.
    Ndjson,
}

/// Generation options for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Surface the model's reasoning text as the thinking channel.
    #[serde(default)]
    pub thinking: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// Opaque session identifier forwarded to the credential provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

/// A fully normalized request, ready for an adapter to translate into the
/// provider's wire shape: options plus the compacted turn list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub options: ChatOptions,
    pub system_instruction: Option<String>,
    pub turns: Vec<WireMessage>,
}

/// Capability set a provider integration must implement.
///
/// `build_wire_request` has no safe default and is therefore required.
/// Parse functions must tolerate missing nested fields: they return the
/// falsy sentinel (`""`, `None`, `vec![]`), never a panic or an error, so
/// one malformed chunk can never abort a stream.
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier, used for registry lookup and credential
    /// resolution.
    fn service_id(&self) -> &str;

    /// Translate a generic request into the provider's wire request body.
    fn build_wire_request(&self, request: &ChatRequest) -> Result<Value>;

    /// Endpoint for a single-shot (non-streaming) exchange. The credential
    /// was resolved beforehand; `None` yields an unauthenticated request.
    fn chat_url(&self, options: &ChatOptions, credential: Option<&str>) -> Result<Url>;

    /// Endpoint for a streaming exchange; may differ from [`Self::chat_url`]
    /// in both path and query.
    fn streaming_chat_url(&self, options: &ChatOptions, credential: Option<&str>) -> Result<Url>;

    /// Framing the transport should decode for this provider.
    fn wire_format(&self) -> WireFormat {
        WireFormat::Sse
    }

    /// Extract visible answer text from one chunk.
    fn parse_content(&self, _chunk: &Value) -> String {
        String::new()
    }

    /// Extract reasoning text from one chunk.
    fn parse_thinking(&self, _chunk: &Value) -> String {
        String::new()
    }

    /// Extract token counts from one chunk.
    fn parse_token_usage(&self, _chunk: &Value) -> Option<TokenUsage> {
        None
    }

    /// Extract structured tool-call requests from one chunk.
    fn parse_tool_calls(&self, _chunk: &Value) -> Vec<ToolCall> {
        Vec::new()
    }
}

/// Explicit adapter registry, constructed once and passed by reference.
///
/// There is no ambient global registry; whoever needs adapters receives
/// this object. A lookup miss is a broken integration, not a runtime
/// condition, and surfaces as [`Error::Configuration`].
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in adapters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(gemini::GeminiAdapter::new()));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters
            .insert(adapter.service_id().to_string(), adapter);
    }

    pub fn get(&self, service_id: &str) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters.get(service_id).cloned().ok_or_else(|| {
            Error::configuration_with_context(
                format!("no adapter registered for service '{}'", service_id),
                ErrorContext::new()
                    .with_field_path("service_id")
                    .with_source("adapter_registry"),
            )
        })
    }

    pub fn service_ids(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }
}
