//! HTTP transport: streaming and single-shot POSTs, plus cooperative
//! cancellation.
//!
//! The transport knows nothing about providers or credentials; the engine
//! resolves the credential and the adapter bakes it into the URL before
//! anything reaches this layer.

pub mod decode;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use url::Url;

use crate::{BoxStream, Error, Result};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("transport error: {0}")]
    Other(String),
}

/// Clonable abort signal for one in-flight request.
///
/// Cancellation is cooperative and is not an error: the event stream stops
/// producing, accumulated buffers are discarded, and the conversation is
/// left exactly as it was before the request started. A timeout is an
/// abort triggered by a deadline.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

pub(crate) fn cancel_pair() -> (CancelHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, rx)
}

/// Thin reqwest wrapper shared by streaming and non-streaming requests.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;
        Ok(Self { client })
    }

    /// POST a request and hand back the raw response byte stream.
    ///
    /// A non-2xx status is raised as [`Error::Remote`] with the
    /// server-provided body text, before any streaming begins.
    pub async fn post_stream(&self, url: Url, body: &Value) -> Result<BoxStream<'static, Bytes>> {
        let response = self
            .client
            .post(url)
            .header("accept", "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let response = Self::check_status(response).await?;
        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(|e| Error::Transport(TransportError::Http(e))));
        Ok(Box::pin(stream))
    }

    /// POST a request and parse the complete response body as one JSON
    /// object (the non-streaming path).
    pub async fn post_json(&self, url: Url, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let response = Self::check_status(response).await?;
        let value = response
            .json::<Value>()
            .await
            .map_err(TransportError::Http)?;
        Ok(value)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(Error::Remote {
            status: status.as_u16(),
            message,
        })
    }
}
