//! Bounded-concurrency dispatcher.
//!
//! Runs a batch of requests with at most `parallelism` transfers in flight
//! and publishes each [`Response`] on a stream as it completes. One handle
//! cancels the whole batch.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{client::HttpClient, download, models::Request, Response};

/// Batch-wide cancellation handle returned alongside the response stream.
#[derive(Clone)]
pub struct PoolHandle {
    cancel: CancellationToken,
    live: Arc<Mutex<Vec<Arc<Response>>>>,
}

impl PoolHandle {
    /// Cancel the whole batch. Idempotent.
    ///
    /// Stops requests that have not started (they are dropped without a
    /// response), cancels every in-flight transfer, and returns once each of
    /// those has resolved. Cancelled in-flight responses are still published,
    /// so the stream drains to a close afterwards.
    pub async fn cancel_all(&self) {
        self.cancel.cancel();
        let live: Vec<_> = self.live.lock().unwrap().clone();
        debug!(in_flight = live.len(), "cancelling download batch");
        for response in live {
            response.wait_done().await;
        }
    }
}

pub(crate) fn download_files<C: HttpClient>(
    client: Arc<C>,
    max_retries: u32,
    requests: Vec<Arc<Request>>,
    parallelism: usize,
) -> (mpsc::Receiver<Arc<Response>>, PoolHandle) {
    let (tx, rx) = mpsc::channel(parallelism.max(1));
    let cancel = CancellationToken::new();
    let live = Arc::new(Mutex::new(Vec::new()));
    let handle = PoolHandle {
        cancel: cancel.clone(),
        live: live.clone(),
    };

    if parallelism == 0 {
        // Nothing may run; dropping the sender closes the stream right away.
        return (rx, handle);
    }

    let semaphore = Arc::new(Semaphore::new(parallelism));
    for request in requests {
        let tx = tx.clone();
        let cancel = cancel.clone();
        let live = live.clone();
        let semaphore = semaphore.clone();
        let client = client.clone();

        tokio::spawn(async move {
            let permit = tokio::select! {
                _ = cancel.cancelled() => return,
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            // Gate and registration under one lock: cancel_all either stops
            // this transfer from starting or finds it in the live list.
            let response = {
                let mut live = live.lock().unwrap();
                if cancel.is_cancelled() {
                    return;
                }
                let response = Response::new(request, cancel.child_token());
                live.push(response.clone());
                response
            };

            download::run(client, response.clone(), max_retries).await;

            // Publication order is completion order. A slow consumer blocks
            // this send, and with it the permit, but never the transfers
            // already in flight.
            let _ = tx.send(response).await;
            drop(permit);
        });
    }

    (rx, handle)
}
