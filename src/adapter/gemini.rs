//! Reference adapter for the Gemini `generateContent` API.
//!
//! Wire shape notes:
//! - turns live in `contents[]` with roles `user`/`model`; system
//!   instructions go in a separate `system_instruction` field
//! - parts are `{text}` or `{inline_data: {mime_type, data}}`
//! - reasoning text arrives as parts flagged `"thought": true`
//! - tool calls arrive as `{functionCall: {name, args}}` parts
//! - streaming uses `:streamGenerateContent?alt=sse`, non-streaming
//!   `:generateContent`; the API key rides in the `key` query parameter

use serde_json::{json, Value};
use url::Url;

use super::{ChatOptions, ChatRequest, ProviderAdapter, WireFormat};
use crate::conversation::{WirePart, WireRole};
use crate::error::ErrorContext;
use crate::types::tool::ToolCall;
use crate::types::usage::TokenUsage;
use crate::{Error, Result};

pub const SERVICE_ID: &str = "gemini";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Stateless translation layer for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiAdapter {
    base_url: String,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the adapter at a different host (proxies, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn endpoint(
        &self,
        options: &ChatOptions,
        credential: Option<&str>,
        streaming: bool,
    ) -> Result<Url> {
        if options.model.is_empty() {
            return Err(Error::configuration_with_context(
                "model is required",
                ErrorContext::new()
                    .with_field_path("options.model")
                    .with_source("gemini_adapter"),
            ));
        }
        let operation = if streaming {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        let raw = format!(
            "{}/models/{}:{}",
            self.base_url.trim_end_matches('/'),
            options.model,
            operation
        );
        let mut url = Url::parse(&raw).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid endpoint URL '{}': {}", raw, e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_source("gemini_adapter"),
            )
        })?;
        if streaming {
            url.query_pairs_mut().append_pair("alt", "sse");
        }
        if let Some(key) = credential {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }

    /// The parts of the first candidate, or an empty slice view of nothing.
    fn candidate_parts(chunk: &Value) -> Option<&Vec<Value>> {
        chunk
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
    }

    fn is_thought(part: &Value) -> bool {
        part.get("thought").and_then(Value::as_bool).unwrap_or(false)
    }
}

impl Default for GeminiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn service_id(&self) -> &str {
        SERVICE_ID
    }

    fn build_wire_request(&self, request: &ChatRequest) -> Result<Value> {
        let contents: Vec<Value> = request
            .turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    WireRole::User => "user",
                    WireRole::Assistant => "model",
                };
                let parts: Vec<Value> = turn
                    .parts
                    .iter()
                    .map(|part| match part {
                        WirePart::Text(text) => json!({ "text": text }),
                        WirePart::InlineData { mime_type, data } => json!({
                            "inline_data": { "mime_type": mime_type, "data": data }
                        }),
                    })
                    .collect();
                json!({ "role": role, "parts": parts })
            })
            .collect();

        let mut body = json!({ "contents": contents });

        if let Some(system) = &request.system_instruction {
            body["system_instruction"] = json!({ "parts": [{ "text": system }] });
        }

        let options = &request.options;
        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = options.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_output_tokens) = options.max_output_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_output_tokens));
        }
        if options.thinking {
            generation_config.insert(
                "thinkingConfig".to_string(),
                json!({ "includeThoughts": true }),
            );
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        if !options.tools.is_empty() {
            let declarations: Vec<Value> = options
                .tools
                .iter()
                .map(|tool| {
                    let mut declaration = json!({ "name": tool.name });
                    if let Some(description) = &tool.description {
                        declaration["description"] = json!(description);
                    }
                    if let Some(parameters) = &tool.parameters {
                        declaration["parameters"] = parameters.clone();
                    }
                    declaration
                })
                .collect();
            body["tools"] = json!([{ "function_declarations": declarations }]);
        }

        Ok(body)
    }

    fn chat_url(&self, options: &ChatOptions, credential: Option<&str>) -> Result<Url> {
        self.endpoint(options, credential, false)
    }

    fn streaming_chat_url(&self, options: &ChatOptions, credential: Option<&str>) -> Result<Url> {
        self.endpoint(options, credential, true)
    }

    fn wire_format(&self) -> WireFormat {
        WireFormat::Sse
    }

    fn parse_content(&self, chunk: &Value) -> String {
        let Some(parts) = Self::candidate_parts(chunk) else {
            return String::new();
        };
        parts
            .iter()
            .filter(|part| !Self::is_thought(part))
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect()
    }

    fn parse_thinking(&self, chunk: &Value) -> String {
        let Some(parts) = Self::candidate_parts(chunk) else {
            return String::new();
        };
        parts
            .iter()
            .filter(|part| Self::is_thought(part))
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect()
    }

    fn parse_token_usage(&self, chunk: &Value) -> Option<TokenUsage> {
        let metadata = chunk.get("usageMetadata")?;
        let input = metadata.get("promptTokenCount").and_then(Value::as_u64);
        let output = metadata.get("candidatesTokenCount").and_then(Value::as_u64);
        let total = metadata.get("totalTokenCount").and_then(Value::as_u64);
        if input.is_none() && output.is_none() && total.is_none() {
            return None;
        }
        Some(TokenUsage::new(input, output, total))
    }

    fn parse_tool_calls(&self, chunk: &Value) -> Vec<ToolCall> {
        let Some(parts) = Self::candidate_parts(chunk) else {
            return Vec::new();
        };
        parts
            .iter()
            .filter_map(|part| part.get("functionCall"))
            .filter_map(|call| {
                let name = call.get("name").and_then(Value::as_str)?;
                Some(ToolCall {
                    id: call
                        .get("id")
                        .and_then(Value::as_str)
                        .map(ToString::to_string),
                    name: name.to_string(),
                    arguments: call.get("args").cloned().unwrap_or_else(|| json!({})),
                })
            })
            .collect()
    }
}
