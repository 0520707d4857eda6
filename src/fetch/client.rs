//! HTTP client seam.
//!
//! The engine never talks to the transport directly; it issues one request
//! at a time through [`HttpClient`] and classifies whatever comes back.
//! TLS, connection reuse and redirect following live below this trait, and
//! implementations must not retry on their own — the engine's loop is the
//! single retry authority.

use std::{future::Future, pin::Pin};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{
    header::{self, HeaderMap},
    Method, Url,
};
use tokio_util::sync::CancellationToken;

use super::{FetchError, Result};

/// Response body as a stream of chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

/// Status, headers and body of a single HTTP exchange, before the engine
/// has classified it.
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

/// One-shot HTTP execution.
pub trait HttpClient: Send + Sync + 'static {
    /// Issue a single request and return the final response after any
    /// redirects. `range_from` asks for `Range: bytes=<offset>-`; the
    /// cancellation token aborts the wait for response headers.
    fn execute(
        &self,
        method: Method,
        url: &Url,
        headers: &HeaderMap,
        range_from: Option<u64>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<RawResponse>> + Send;
}

/// Production [`HttpClient`] backed by a shared `reqwest::Client`.
///
/// Redirects are followed by reqwest's default policy; only the final
/// response is surfaced. The client performs no retries.
#[derive(Clone, Default)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HttpClient for ReqwestClient {
    async fn execute(
        &self,
        method: Method,
        url: &Url,
        headers: &HeaderMap,
        range_from: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<RawResponse> {
        let mut builder = self.client.request(method, url.clone()).headers(headers.clone());
        if let Some(offset) = range_from {
            builder = builder.header(header::RANGE, format!("bytes={offset}-"));
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            sent = builder.send() => sent.map_err(|e| FetchError::Transport(e.to_string()))?,
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body: BodyStream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| FetchError::Transport(e.to_string())))
            .boxed();

        Ok(RawResponse { status, headers, body })
    }
}
