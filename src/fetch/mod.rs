//! Resumable HTTP downloads.
//!
//! [`Fetch`] owns the engine configuration: default headers, the retry
//! budget and the HTTP client seam. It builds validated [`Request`]s,
//! drives single downloads ([`Fetch::download_file`]) and bounded batches
//! ([`Fetch::download_files`]), and carries the thin text/JSON helpers the
//! rest of a program typically needs next to its downloads.

pub mod cookies;

mod backoff;
mod client;
mod download;
mod models;
mod pool;
mod progress;

pub use backoff::{delay_before_attempt, fibonacci};
pub use client::{BodyStream, HttpClient, RawResponse, ReqwestClient};
pub use models::{Request, Response};
pub use pool::PoolHandle;

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT},
    Url,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// User-Agent sent when the engine's constructor is not given another one.
const DEFAULT_USER_AGENT: &str = concat!("fetchkit/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// URL or header syntax rejected at request construction.
    #[error("failed to create request: {0}")]
    InvalidRequest(String),

    /// Local filesystem failure.
    #[error("{}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    /// Network-level failure: DNS, connect, TLS, or an interrupted body
    /// read not caused by cancellation. Retried.
    #[error("network error: {0}")]
    Transport(String),

    /// The server answered with a status that is not one of the handled
    /// success cases (200, 206, 416). Retried only for `5xx`.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// The cancel handle fired before completion.
    #[error("download cancelled")]
    Cancelled,

    /// Hashing the finished file failed.
    #[error("hashing failed: {0}")]
    Hashing(String),

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl FetchError {
    /// Transient failures go back through the retry loop; everything else
    /// resolves the response immediately.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::HttpStatus(code) => *code >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Download engine configuration and entry points.
///
/// Cheap to share behind an `Arc` if several parts of a program submit
/// downloads; the underlying HTTP client is safe for concurrent use.
pub struct Fetch<C: HttpClient = ReqwestClient> {
    client: Arc<C>,
    rest: reqwest::Client,
    headers: HeaderMap,
    max_retries: u32,
}

impl<C: HttpClient> std::fmt::Debug for Fetch<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetch")
            .field("headers", &self.headers)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl Fetch<ReqwestClient> {
    /// Engine backed by the production reqwest client.
    ///
    /// `headers` become the defaults for every request; a `User-Agent`
    /// supplied here replaces the built-in one. Total attempts per request
    /// are `max_retries + 1`.
    pub fn new(headers: Option<HashMap<String, String>>, max_retries: u32) -> Result<Self> {
        Self::with_client(ReqwestClient::new(), headers, max_retries)
    }
}

impl<C: HttpClient> Fetch<C> {
    /// Engine with a caller-supplied [`HttpClient`] implementation.
    ///
    /// The client must not retry on its own; the engine's loop is the
    /// single retry authority.
    pub fn with_client(
        client: C,
        headers: Option<HashMap<String, String>>,
        max_retries: u32,
    ) -> Result<Self> {
        let mut effective = HeaderMap::new();
        effective.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        effective.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(headers) = &headers {
            overlay(&mut effective, headers)?;
        }

        Ok(Self {
            client: Arc::new(client),
            rest: reqwest::Client::new(),
            headers: effective,
            max_retries,
        })
    }

    /// Build a validated download request with the engine's headers.
    ///
    /// URL and header syntax are checked here, not at download time.
    pub fn new_request(&self, url: &str, file_path: impl Into<PathBuf>) -> Result<Arc<Request>> {
        self.new_request_with_headers(url, file_path, &HashMap::new())
    }

    /// Build a request with extra headers overlaid on the engine defaults.
    ///
    /// Caller headers win on collision, except `User-Agent`: the engine
    /// re-imposes its own value. A different UA is configured at engine
    /// construction, not per request.
    pub fn new_request_with_headers(
        &self,
        url: &str,
        file_path: impl Into<PathBuf>,
        headers: &HashMap<String, String>,
    ) -> Result<Arc<Request>> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let headers = self.request_headers(Some(headers))?;

        Ok(Arc::new(Request {
            url,
            file_path: file_path.into(),
            headers,
        }))
    }

    /// Start a download and return its live handle immediately.
    ///
    /// The transfer runs as its own task; must be called within a Tokio
    /// runtime. The returned [`Response`] never panics its caller — all
    /// failures, including retryable ones, resolve into its terminal error.
    pub fn download_file(&self, request: Arc<Request>) -> Arc<Response> {
        let response = Response::new(request, CancellationToken::new());
        tokio::spawn(download::run(
            self.client.clone(),
            response.clone(),
            self.max_retries,
        ));
        response
    }

    /// Download a batch with at most `parallelism` transfers in flight.
    ///
    /// Responses are published in completion order. The stream closes after
    /// the last response, or after [`PoolHandle::cancel_all`] has torn the
    /// batch down. `parallelism == 0` closes the stream immediately.
    pub fn download_files(
        &self,
        requests: Vec<Arc<Request>>,
        parallelism: usize,
    ) -> (mpsc::Receiver<Arc<Response>>, PoolHandle) {
        pool::download_files(self.client.clone(), self.max_retries, requests, parallelism)
    }

    /// GET a URL and return the body as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let headers = self.headers.clone();
        let response = self
            .send_with_retries(|| self.rest.get(url.clone()).headers(headers.clone()))
            .await?;
        response
            .text()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// GET a URL and deserialize the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<T> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let headers = self.request_headers(headers)?;
        let response = self
            .send_with_retries(|| self.rest.get(url.clone()).headers(headers.clone()))
            .await?;
        response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// POST a JSON body and deserialize the JSON response.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<T> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let headers = self.request_headers(headers)?;
        let response = self
            .send_with_retries(|| self.rest.post(url.clone()).headers(headers.clone()).json(body))
            .await?;
        response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }

    /// Effective headers for one exchange: engine defaults, caller overlay,
    /// engine User-Agent re-imposed.
    fn request_headers(&self, extra: Option<&HashMap<String, String>>) -> Result<HeaderMap> {
        let mut effective = self.headers.clone();
        if let Some(extra) = extra {
            overlay(&mut effective, extra)?;
            if let Some(ua) = self.headers.get(USER_AGENT) {
                effective.insert(USER_AGENT, ua.clone());
            }
        }
        Ok(effective)
    }

    /// Shared retry loop of the text/JSON helpers: same single retry
    /// authority and Fibonacci schedule as the download engine.
    async fn send_with_retries(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff::delay_before_attempt(attempt)).await;
            }

            match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let err = FetchError::HttpStatus(response.status().as_u16());
                    if err.is_transient() && attempt < self.max_retries {
                        last_error = Some(err);
                    } else {
                        return Err(err);
                    }
                }
                Err(e) => {
                    let err = FetchError::Transport(e.to_string());
                    if attempt < self.max_retries {
                        last_error = Some(err);
                    } else {
                        return Err(err);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Transport("retries exhausted".into())))
    }
}

fn overlay(into: &mut HeaderMap, headers: &HashMap<String, String>) -> Result<()> {
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| FetchError::InvalidRequest(format!("invalid header name {name:?}: {e}")))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            FetchError::InvalidRequest(format!("invalid value for header {name}: {e}"))
        })?;
        into.insert(header_name, header_value);
    }
    Ok(())
}
