//! Extended stream orchestration: pass-through event iteration,
//! cross-channel side state, reconciliation, cancellation.

use std::collections::VecDeque;

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::adapter::ChatOptions;
use crate::conversation::Conversation;
use crate::demux::ChannelDemux;
use crate::transport::{cancel_pair, CancelHandle};
use crate::types::events::{ChannelBuffers, StreamEvent};
use crate::types::message::Message;
use crate::types::tool::ToolCall;
use crate::types::usage::{Pricing, TokenUsage};
use crate::{BoxStream, Result};

/// The final, fully-assembled result of one request: reconciled channel
/// buffers plus a point-in-time copy of the conversation's messages taken
/// at commit time.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledResponse {
    pub service_id: String,
    pub options: ChatOptions,
    pub usage: Option<TokenUsage>,
    pub content: String,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub messages: Vec<Message>,
}

impl ReconciledResponse {
    pub(crate) fn new(
        service_id: String,
        options: ChatOptions,
        buffers: ChannelBuffers,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            service_id,
            options,
            usage: buffers.usage,
            content: buffers.content,
            thinking: if buffers.thinking.is_empty() {
                None
            } else {
                Some(buffers.thinking)
            },
            tool_calls: buffers.tool_calls,
            messages,
        }
    }
}

/// One in-flight extended-mode request.
///
/// Re-exposes the demultiplexer's event sequence via [`next_event`]
/// while maintaining the cross-channel side state, and resolves to the
/// [`ReconciledResponse`] via [`complete`] regardless of how many events
/// the caller consumed.
///
/// Holding the mutable borrow of the conversation for the lifetime of the
/// turn is what enforces the single-outstanding-request discipline: no
/// second request can start, and no one can mutate the history, until this
/// turn is finished or dropped.
///
/// [`next_event`]: ExtendedTurn::next_event
/// [`complete`]: ExtendedTurn::complete
pub struct ExtendedTurn<'c> {
    service_id: String,
    options: ChatOptions,
    chunks: BoxStream<'static, Value>,
    demux: Option<ChannelDemux>,
    conversation: &'c mut Conversation,
    pending_user: Option<Message>,
    pending_events: VecDeque<StreamEvent>,
    final_buffers: Option<ChannelBuffers>,
    cancel: CancelHandle,
    cancel_rx: watch::Receiver<bool>,
    pricing: Option<Pricing>,
    event_count: usize,
    finished: bool,
    aborted: bool,
}

impl<'c> ExtendedTurn<'c> {
    pub(crate) fn new(
        service_id: String,
        options: ChatOptions,
        chunks: BoxStream<'static, Value>,
        demux: ChannelDemux,
        conversation: &'c mut Conversation,
        pending_user: Message,
        pricing: Option<Pricing>,
    ) -> Self {
        let (cancel, cancel_rx) = cancel_pair();
        Self {
            service_id,
            options,
            chunks,
            demux: Some(demux),
            conversation,
            pending_user: Some(pending_user),
            pending_events: VecDeque::new(),
            final_buffers: None,
            cancel,
            cancel_rx,
            pricing,
            event_count: 0,
            finished: false,
            aborted: false,
        }
    }

    /// Clonable abort signal for this request. Usable from any task;
    /// cancellation takes effect at the next suspension point.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Next stream event, or `None` once the stream is exhausted or
    /// aborted. The final event before natural exhaustion is the
    /// [`StreamEvent::Buffers`] snapshot; commit has already happened when
    /// it is delivered.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        if let Some(event) = self.pending_events.pop_front() {
            return Some(Ok(event));
        }
        if self.finished || self.aborted {
            return None;
        }
        loop {
            // A cancel that happened before this call is observed here,
            // ahead of any further transport reads.
            if *self.cancel_rx.borrow() {
                self.observe_abort();
                return None;
            }
            tokio::select! {
                _ = self.cancel_rx.changed() => {
                    self.observe_abort();
                    return None;
                }
                chunk = self.chunks.next() => match chunk {
                    Some(Ok(value)) => {
                        let Some(demux) = self.demux.as_mut() else {
                            return None;
                        };
                        let mut events = demux.feed(&value);
                        if events.is_empty() {
                            continue;
                        }
                        self.event_count += events.len();
                        let first = events.remove(0);
                        self.pending_events.extend(events);
                        return Some(Ok(first));
                    }
                    Some(Err(e)) => return Some(Err(e)),
                    None => {
                        self.finished = true;
                        if self.event_count == 0 {
                            warn!(service = %self.service_id, "stream ended without any events");
                        }
                        let buffers = self.commit_on_exhaustion();
                        return Some(Ok(StreamEvent::Buffers { buffers }));
                    }
                }
            }
        }
    }

    /// Drain any unconsumed events and return the reconciled response.
    ///
    /// On natural exhaustion this includes everything committed to the
    /// conversation; after an abort the discarded buffers are reported
    /// empty and the message snapshot is the untouched history.
    pub async fn complete(mut self) -> Result<ReconciledResponse> {
        while let Some(event) = self.next_event().await {
            event?;
        }
        let buffers = self.final_buffers.take().unwrap_or_default();
        Ok(ReconciledResponse::new(
            self.service_id,
            self.options,
            buffers,
            self.conversation.snapshot(),
        ))
    }

    /// Running content accumulated so far.
    pub fn content(&self) -> &str {
        self.state().map(|b| b.content.as_str()).unwrap_or("")
    }

    /// Running thinking text accumulated so far.
    pub fn thinking(&self) -> &str {
        self.state().map(|b| b.thinking.as_str()).unwrap_or("")
    }

    /// Latest parsed usage record.
    pub fn usage(&self) -> Option<TokenUsage> {
        self.state().and_then(|b| b.usage)
    }

    /// Cost of the usage observed so far, when pricing is configured.
    pub fn cost(&self) -> Option<f64> {
        let pricing = self.pricing?;
        Some(pricing.cost(&self.usage()?))
    }

    /// Tool calls observed so far.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.state().map(|b| b.tool_calls.as_slice()).unwrap_or(&[])
    }

    fn state(&self) -> Option<&ChannelBuffers> {
        self.demux
            .as_ref()
            .map(ChannelDemux::buffers)
            .or(self.final_buffers.as_ref())
    }

    /// Commit runs only here, on natural exhaustion. Taking the demux out
    /// of its slot makes a second commit impossible.
    fn commit_on_exhaustion(&mut self) -> ChannelBuffers {
        let Some(demux) = self.demux.take() else {
            return ChannelBuffers::default();
        };
        let buffers = demux.finish();
        self.conversation.commit(
            self.pending_user.take(),
            buffers.clone(),
            self.pricing.as_ref(),
        );
        self.final_buffers = Some(buffers.clone());
        buffers
    }

    fn observe_abort(&mut self) {
        self.aborted = true;
        // Close the transport by dropping the underlying response stream;
        // buffers stay in the demux and are never committed.
        self.chunks = Box::pin(futures::stream::empty());
        debug!(service = %self.service_id, "request aborted; buffers discarded");
    }
}
