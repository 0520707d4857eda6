//! Single-file download core.
//!
//! Drives one [`Request`](super::Request) end to end: probe the bytes
//! already on disk, issue a (possibly ranged) GET, stream the body into the
//! destination file, retry transient failures on the Fibonacci schedule,
//! and fingerprint the finished artifact. The terminal outcome is resolved
//! into the [`Response`] handed to the caller up front.

use std::{
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use futures_util::StreamExt;
use reqwest::Method;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use super::{
    backoff,
    client::{BodyStream, HttpClient},
    models::{content_length, content_range_total, Response},
    progress::{ProgressFn, ProgressSink},
    FetchError, Result,
};
use crate::crypto;

/// Execute the transfer and resolve the response. Runs as its own task.
#[instrument(level = "debug", skip_all, fields(url = %response.request().url))]
pub(crate) async fn run<C: HttpClient>(client: Arc<C>, response: Arc<Response>, max_retries: u32) {
    let outcome = drive(client.as_ref(), &response, max_retries).await;
    match &outcome {
        Ok(_) => info!(
            status = response.status_code(),
            bytes = response.downloaded(),
            "download complete"
        ),
        Err(err) => warn!(error = %err, "download failed"),
    }
    response.resolve(outcome);
}

/// Retry loop around [`attempt_once`]. Total attempts are `max_retries + 1`;
/// the sleep before attempt `n` is `fib(n)` seconds.
async fn drive<C: HttpClient>(
    client: &C,
    response: &Arc<Response>,
    max_retries: u32,
) -> Result<String> {
    let cancel = response.cancel_token().clone();
    let mut last_error = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff::delay_before_attempt(attempt);
            debug!(attempt, delay_secs = delay.as_secs(), "backing off before retry");
            tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match attempt_once(client, response).await {
            Ok(hash) => return Ok(hash),
            Err(err) if err.is_transient() && attempt < max_retries => {
                warn!(attempt, error = %err, "transient failure, retrying");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_error.unwrap_or_else(|| FetchError::Transport("retries exhausted".into())))
}

/// One attempt: probe, open, request, classify, stream, rehash.
///
/// Each attempt re-probes the destination, so bytes written by a failed
/// attempt become the resume base of the next one.
async fn attempt_once<C: HttpClient>(client: &C, response: &Arc<Response>) -> Result<String> {
    let request = response.request_arc();
    let path = request.file_path.clone();

    let resume_from = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => {
            return Err(FetchError::Io {
                path,
                message: format!("could not stat file: {e}"),
            })
        }
    };
    response.raise_downloaded(resume_from);

    // Append mode keeps pre-existing bytes; parent directories are the
    // caller's responsibility.
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(&path)
        .await
        .map_err(|e| FetchError::Io {
            path: path.clone(),
            message: format!("could not open file: {e}"),
        })?;

    if resume_from > 0 {
        debug!(resume_from, "resuming download");
    }

    let raw = client
        .execute(
            Method::GET,
            &request.url,
            &request.headers,
            (resume_from > 0).then_some(resume_from),
            response.cancel_token(),
        )
        .await?;
    response.set_status(raw.status);

    match raw.status {
        200 => {
            // Server ignored the range (or none was sent): restart from zero
            // so the digest matches what it actually served. The published
            // counter does not follow the truncation down; it holds its
            // high-water mark and the new stream counts from base zero.
            file.set_len(0).await.map_err(|e| FetchError::Io {
                path: path.clone(),
                message: format!("could not truncate file: {e}"),
            })?;
            response.set_size(content_length(&raw.headers).unwrap_or(0));
            stream_body(file, raw.body, response, 0).await?;
        }
        206 => {
            let size = content_range_total(&raw.headers)
                .or_else(|| content_length(&raw.headers).map(|len| resume_from + len))
                .unwrap_or(0);
            response.set_size(size);
            stream_body(file, raw.body, response, resume_from).await?;
        }
        416 => {
            // The bytes on disk already form the whole artifact.
            debug!(bytes = resume_from, "range not satisfiable, file already complete");
            response.set_size(resume_from);
        }
        status => return Err(FetchError::HttpStatus(status)),
    }

    // The on-disk file is the source of truth for the digest, including the
    // pre-existing prefix a resumed transfer appended to.
    crypto::blake3_hex_file(&path)
        .await
        .map_err(|e| FetchError::Hashing(format!("{}: {e}", path.display())))
}

/// Stream the body into the file, publishing `base` plus the bytes written
/// so far into the response after every write.
async fn stream_body(
    file: tokio::fs::File,
    mut body: BodyStream,
    response: &Arc<Response>,
    base: u64,
) -> Result<()> {
    let path = response.request().file_path.clone();
    let cancel = response.cancel_token().clone();
    let counter = response.clone();
    let streamed = AtomicU64::new(0);
    let mut sink = ProgressSink::new(
        file,
        Some(Box::new(move |delta| {
            let written = streamed.fetch_add(delta, Ordering::Relaxed) + delta;
            counter.raise_downloaded(base + written);
        }) as ProgressFn),
    );

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            chunk = body.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;
        sink.write_all(&chunk).await.map_err(|e| FetchError::Io {
            path: path.clone(),
            message: format!("write failed: {e}"),
        })?;
    }

    sink.flush().await.map_err(|e| FetchError::Io {
        path: path.clone(),
        message: format!("flush failed: {e}"),
    })?;
    sink.shutdown().await.map_err(|e| FetchError::Io {
        path,
        message: format!("close failed: {e}"),
    })?;

    Ok(())
}
