//! # chat-engine-rust
//!
//! Client-side conversation engine for generative-language-model backends
//! over streaming HTTP: it keeps a conversation's message history,
//! translates it to and from a provider's wire format, and demultiplexes an
//! incrementally-delivered response that interleaves several logical
//! channels (visible answer text, reasoning "thinking" text, token-usage
//! metadata, and structured tool calls) into a live event feed plus a
//! final reconciled snapshot.
//!
//! ## Core pieces
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`engine`] | Top-level client: `send` / `chat`, one request at a time |
//! | [`demux`] | Channel extraction and accumulation over decoded chunks |
//! | [`orchestrator`] | Extended-mode turn: event feed + `complete()` |
//! | [`conversation`] | Append-only history, commit, role compaction |
//! | [`adapter`] | Provider capability contract + the Gemini reference |
//! | [`transport`] | HTTP transport, SSE/NDJSON framing, cancellation |
//! | [`credentials`] | One-shot async credential resolution |
//! | [`types`] | Messages, events, tool calls, token usage |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chat_engine_rust::{Engine, GeminiAdapter, StreamEvent};
//!
//! #[tokio::main]
//! async fn main() -> chat_engine_rust::Result<()> {
//!     let mut engine = Engine::builder()
//!         .adapter(Arc::new(GeminiAdapter::new()))
//!         .model("gemini-2.0-flash")
//!         .thinking(true)
//!         .build()?;
//!
//!     let mut turn = engine.chat("Why is the sky blue?").await?;
//!     while let Some(event) = turn.next_event().await {
//!         if let StreamEvent::Content { text } = event? {
//!             print!("{text}");
//!         }
//!     }
//!     let response = turn.complete().await?;
//!     println!("\n{} tokens", response.usage.map(|u| u.total()).unwrap_or(0));
//!     Ok(())
//! }
//! ```
//!
//! Commit semantics: accumulated buffers become permanent messages exactly
//! once, on natural stream exhaustion only. Aborting a request (via the
//! turn's [`CancelHandle`]) discards the buffers and leaves the
//! conversation exactly as it was before the request started.

pub mod adapter;
pub mod conversation;
pub mod credentials;
pub mod demux;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod transport;
pub mod types;

pub use adapter::gemini::GeminiAdapter;
pub use adapter::{AdapterRegistry, ChatOptions, ChatRequest, ProviderAdapter, WireFormat};
pub use conversation::{Conversation, WireMessage, WirePart, WirePayload, WireRole};
pub use credentials::{CredentialProvider, EnvCredentials, KeyringCredentials, StaticCredential};
pub use demux::ChannelDemux;
pub use engine::{Engine, EngineBuilder};
pub use error::{Error, ErrorContext};
pub use orchestrator::{ExtendedTurn, ReconciledResponse};
pub use transport::{CancelHandle, HttpTransport};
pub use types::{
    Attachment, Channel, ChannelBuffers, Message, MessageContent, Pricing, Role, StreamEvent,
    TokenUsage, ToolCall, ToolDefinition,
};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Unified boxed stream alias used across the transport and demux layers
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;
