//! Content hashing helpers.
//!
//! Hex-encoded digests over byte slices, strings and files. The download
//! engine uses [`blake3_hex_file`] to fingerprint finished artifacts; the
//! SHA-256 helpers exist for callers that need to compare against upstream
//! checksum manifests.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::{fs::File, io::AsyncReadExt};

const FILE_CHUNK: usize = 64 * 1024;

/// SHA-256 of a byte slice as a lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// SHA-256 of a string as a lowercase hex string.
///
/// ```
/// assert_eq!(
///     fetchkit::crypto::sha256_hex_str("hello world"),
///     "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
/// );
/// ```
pub fn sha256_hex_str(s: &str) -> String {
    sha256_hex(s.as_bytes())
}

/// Streaming SHA-256 of the file at `path` as a lowercase hex string.
pub async fn sha256_hex_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    let mut file = File::open(path.as_ref()).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; FILE_CHUNK];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Blake3 of a byte slice as a lowercase hex string.
pub fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Streaming Blake3 of the file at `path` as a lowercase hex string.
pub async fn blake3_hex_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    let mut file = File::open(path.as_ref()).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; FILE_CHUNK];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}
