//! Data model of the download engine.
//!
//! A [`Request`] is an immutable, pre-validated descriptor produced by the
//! engine's factory. A [`Response`] is the live handle returned before the
//! transfer completes: the engine writes to it, the caller reads from it and
//! may cancel through it.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU16, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use reqwest::{header::HeaderMap, Url};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{FetchError, Result};

/// An immutable download descriptor.
///
/// Construction goes through [`Fetch::new_request`](super::Fetch::new_request),
/// which parses the URL and builds the effective header map eagerly, so a
/// `Request` that exists is guaranteed to be syntactically valid.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub file_path: PathBuf,
    pub headers: HeaderMap,
}

#[derive(Default)]
struct Terminal {
    error: Option<FetchError>,
    hash: Option<String>,
}

/// Live handle to one download.
///
/// Returned immediately by [`Fetch::download_file`](super::Fetch::download_file)
/// while the transfer proceeds in the background. Progress counters are
/// readable at any time; the terminal error and content hash become stable
/// once [`Response::is_complete`] turns true, which happens exactly once.
pub struct Response {
    request: Arc<Request>,
    status: AtomicU16,
    size: AtomicU64,
    downloaded: AtomicU64,
    terminal: Mutex<Terminal>,
    done: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl Response {
    pub(crate) fn new(request: Arc<Request>, cancel: CancellationToken) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            request,
            status: AtomicU16::new(0),
            size: AtomicU64::new(0),
            downloaded: AtomicU64::new(0),
            terminal: Mutex::new(Terminal::default()),
            done,
            cancel,
        })
    }

    /// The request this response belongs to.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub(crate) fn request_arc(&self) -> Arc<Request> {
        self.request.clone()
    }

    /// HTTP status of the final attempt, or 0 before any response arrived.
    pub fn status_code(&self) -> u16 {
        self.status.load(Ordering::Acquire)
    }

    /// Expected total byte length of the finished artifact, 0 when unknown.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Bytes on disk, including any present before the transfer.
    ///
    /// Never decreases. When a restarted transfer truncates the destination
    /// (a 200 after the server ignored a `Range`), the counter holds its
    /// high-water mark until the new stream passes it.
    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Acquire)
    }

    /// Completion ratio in `[0, 1]`.
    ///
    /// `downloaded / size` while the size is known; with no advertised size
    /// it stays 0 until the download completes successfully, then reads 1.
    pub fn progress(&self) -> f64 {
        let size = self.size();
        if size > 0 {
            (self.downloaded() as f64 / size as f64).min(1.0)
        } else if self.is_complete() && self.error().is_none() {
            1.0
        } else {
            0.0
        }
    }

    /// Lowercase hex Blake3 digest of the finished file; `None` until the
    /// download completed without error.
    pub fn hash(&self) -> Option<String> {
        self.terminal.lock().unwrap().hash.clone()
    }

    /// Terminal error, if the download resolved with one.
    pub fn error(&self) -> Option<FetchError> {
        self.terminal.lock().unwrap().error.clone()
    }

    /// Whether the completion signal has fired.
    pub fn is_complete(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait for completion and report the terminal outcome.
    pub async fn wait(&self) -> Result<()> {
        self.wait_done().await;
        match self.error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Read the finished artifact from disk.
    ///
    /// Waits for completion first; fails with the download's own error if it
    /// resolved unsuccessfully.
    pub async fn bytes(&self) -> Result<Vec<u8>> {
        self.wait().await?;
        tokio::fs::read(&self.request.file_path)
            .await
            .map_err(|e| FetchError::Io {
                path: self.request.file_path.clone(),
                message: format!("failed to read file: {e}"),
            })
    }

    /// Request cancellation.
    ///
    /// Idempotent and non-blocking: the engine abandons in-flight I/O and any
    /// pending retry sleep, resolves with [`FetchError::Cancelled`], and
    /// leaves partial bytes on disk for a later resume. Cancelling after
    /// completion is a no-op.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) async fn wait_done(&self) {
        let mut rx = self.done.subscribe();
        // The sender lives inside self, so this cannot fail while we are
        // borrowed.
        let _ = rx.wait_for(|done| *done).await;
    }

    pub(crate) fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::Release);
    }

    pub(crate) fn set_size(&self, size: u64) {
        self.size.store(size, Ordering::Release);
    }

    /// Publish a new bytes-on-disk observation. Monotone by construction:
    /// values below the current count are ignored.
    pub(crate) fn raise_downloaded(&self, bytes: u64) {
        self.downloaded.fetch_max(bytes, Ordering::AcqRel);
    }

    /// Freeze the terminal state and fire the one-shot completion signal.
    pub(crate) fn resolve(&self, outcome: Result<String>) {
        {
            let mut terminal = self.terminal.lock().unwrap();
            if *self.done.borrow() {
                return;
            }
            match outcome {
                Ok(hash) => terminal.hash = Some(hash),
                Err(err) => terminal.error = Some(err),
            }
        }
        self.done.send_replace(true);
    }
}

/// Extract the total length from a `Content-Range: bytes A-B/Total` header.
///
/// Best effort: returns `None` for absent headers, `*` totals, or anything
/// that does not parse.
pub(crate) fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::CONTENT_RANGE)?.to_str().ok()?;
    let total = value.rsplit('/').next()?;
    total.trim().parse().ok()
}

/// Extract a numeric `Content-Length`, if the server sent one.
pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}
