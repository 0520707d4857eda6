//! fetchkit — resumable HTTP downloads and the small utilities around them.
//!
//! The centerpiece is the [`fetch`] module: a download engine that resumes
//! interrupted transfers with HTTP range requests, retries transient failures
//! on a Fibonacci backoff schedule, reports live progress, and fingerprints
//! every finished file with a Blake3 digest. A bounded pool runs many
//! downloads at once and hands back responses as they complete.
//!
//! ```no_run
//! use fetchkit::Fetch;
//!
//! # async fn run() -> Result<(), fetchkit::FetchError> {
//! let fetch = Fetch::new(None, 3)?;
//! let request = fetch.new_request("https://example.com/data.bin", "data.bin")?;
//! let response = fetch.download_file(request);
//! response.wait().await?;
//! println!("blake3 = {}", response.hash().unwrap());
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod fetch;

pub use fetch::{
    cookies::{cookie_header, cookies_from_file, Cookie},
    Fetch, FetchError, HttpClient, PoolHandle, RawResponse, Request, ReqwestClient, Response,
    Result,
};
