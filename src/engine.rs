//! Top-level client: owns one conversation, drives one request at a time.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::adapter::{AdapterRegistry, ChatOptions, ChatRequest, ProviderAdapter};
use crate::conversation::Conversation;
use crate::credentials::{CredentialProvider, EnvCredentials};
use crate::demux::ChannelDemux;
use crate::error::ErrorContext;
use crate::orchestrator::{ExtendedTurn, ReconciledResponse};
use crate::transport::{decode, HttpTransport};
use crate::types::message::{Message, MessageContent};
use crate::types::tool::ToolDefinition;
use crate::types::usage::Pricing;
use crate::{Error, Result};

type SharedContentParser = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Builder for [`Engine`]. The adapter is the one dependency with no
/// default; everything else falls back to environment credentials, a
/// 10-minute request timeout, and no pricing.
pub struct EngineBuilder {
    adapter: Option<Arc<dyn ProviderAdapter>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    pricing: Option<Pricing>,
    options: ChatOptions,
    timeout: Duration,
    content_parser: Option<SharedContentParser>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            adapter: None,
            credentials: None,
            pricing: None,
            options: ChatOptions::default(),
            timeout: Duration::from_secs(600),
            content_parser: None,
        }
    }

    pub fn adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Resolve the adapter from an explicit registry. A lookup miss is a
    /// broken integration and fails here, before any request is attempted.
    pub fn service(mut self, registry: &AdapterRegistry, service_id: &str) -> Result<Self> {
        self.adapter = Some(registry.get(service_id)?);
        Ok(self)
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = Some(pricing);
        self
    }

    pub fn options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.options.max_output_tokens = Some(max);
        self
    }

    /// Enable extended mode's thinking channel.
    pub fn thinking(mut self, thinking: bool) -> Self {
        self.options.thinking = thinking;
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.options.tools = tools;
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.options.session_id = Some(session_id.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Post-processing applied to the content buffer before it is
    /// committed (e.g., stripping provider markup).
    pub fn content_parser(
        mut self,
        parser: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.content_parser = Some(Arc::new(parser));
        self
    }

    pub fn build(self) -> Result<Engine> {
        let adapter = self.adapter.ok_or_else(|| {
            Error::configuration_with_context(
                "provider adapter is required",
                ErrorContext::new()
                    .with_field_path("adapter")
                    .with_source("engine_builder"),
            )
        })?;
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(EnvCredentials::new()));
        Ok(Engine {
            adapter,
            credentials,
            transport: HttpTransport::new(self.timeout)?,
            pricing: self.pricing,
            options: self.options,
            content_parser: self.content_parser,
            conversation: Conversation::new(),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Conversation engine: wires adapter, transport, demultiplexer and
/// orchestrator together around one exclusively-owned [`Conversation`].
///
/// At most one request is outstanding at a time; [`Engine::chat`] borrows
/// the engine mutably for the lifetime of the returned turn, so a second
/// request cannot even be expressed until the first is finished. Abort is
/// the turn's [`CancelHandle`](crate::transport::CancelHandle).
pub struct Engine {
    adapter: Arc<dyn ProviderAdapter>,
    credentials: Arc<dyn CredentialProvider>,
    transport: HttpTransport,
    pricing: Option<Pricing>,
    options: ChatOptions,
    content_parser: Option<SharedContentParser>,
    conversation: Conversation,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ChatOptions {
        &mut self.options
    }

    pub fn service_id(&self) -> &str {
        self.adapter.service_id()
    }

    /// Build the wire body for the history plus the outgoing user turn and
    /// resolve the credential. Resolution happens once, before URL
    /// construction.
    async fn prepare(&self, user: &Message) -> Result<(serde_json::Value, Option<String>)> {
        let mut payload = self.conversation.serialize_for_provider();
        if let Some(turn) = user.to_wire() {
            payload.turns.push(turn);
        }
        let request = ChatRequest {
            options: self.options.clone(),
            system_instruction: payload.system_instruction,
            turns: payload.turns,
        };
        let body = self.adapter.build_wire_request(&request)?;
        let credential = self
            .credentials
            .credential(self.adapter.service_id(), self.options.session_id.as_deref())
            .await?;
        Ok((body, credential))
    }

    fn demux(&self) -> ChannelDemux {
        let demux = ChannelDemux::new(self.adapter.clone());
        match &self.content_parser {
            Some(parser) => {
                let parser = parser.clone();
                demux.with_content_parser(move |text| parser(text))
            }
            None => demux,
        }
    }

    /// Streaming request in extended mode. The user message is part of the
    /// transmitted history immediately but is only committed, together
    /// with the response buffers, on natural stream exhaustion, so an
    /// aborted request leaves the conversation untouched.
    pub async fn chat(&mut self, content: impl Into<MessageContent>) -> Result<ExtendedTurn<'_>> {
        let user = Message::user(content.into());
        let (body, credential) = self.prepare(&user).await?;
        let url = self
            .adapter
            .streaming_chat_url(&self.options, credential.as_deref())?;
        let request_id = uuid::Uuid::new_v4();
        debug!(
            service = %self.adapter.service_id(),
            %request_id,
            model = %self.options.model,
            "starting streaming request"
        );
        let bytes = self.transport.post_stream(url, &body).await?;
        let chunks = decode::decoder_for(self.adapter.wire_format()).decode(bytes);
        let demux = self.demux();
        let service_id = self.adapter.service_id().to_string();
        let options = self.options.clone();
        let pricing = self.pricing;
        Ok(ExtendedTurn::new(
            service_id,
            options,
            chunks,
            demux,
            &mut self.conversation,
            user,
            pricing,
        ))
    }

    /// Non-streaming request: one complete JSON response, parsed with the
    /// same adapter extractors and committed through the same path as a
    /// stream (a single chunk followed by exhaustion).
    pub async fn send(&mut self, content: impl Into<MessageContent>) -> Result<ReconciledResponse> {
        let user = Message::user(content.into());
        let (body, credential) = self.prepare(&user).await?;
        let url = self.adapter.chat_url(&self.options, credential.as_deref())?;
        debug!(
            service = %self.adapter.service_id(),
            model = %self.options.model,
            "sending non-streaming request"
        );
        let value = self.transport.post_json(url, &body).await?;
        let mut demux = self.demux();
        demux.feed(&value);
        let buffers = demux.finish();
        let reconciled = buffers.clone();
        self.conversation
            .commit(Some(user), buffers, self.pricing.as_ref());
        Ok(ReconciledResponse::new(
            self.adapter.service_id().to_string(),
            self.options.clone(),
            reconciled,
            self.conversation.snapshot(),
        ))
    }
}
