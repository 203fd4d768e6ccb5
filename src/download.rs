//! The download collaborator contract.
//!
//! Attachment media lives with the host; this crate only hands a
//! collaborator everything it needs to fetch one item: the descriptor, a
//! content-addressed identifier, and a destination path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::model::AttachmentDescriptor;

/// Bytes of the SHA-256 digest kept in the content-addressed identifier.
const HASH_PREFIX_LEN: usize = 16;

/// Fetches media referenced by an attachment descriptor.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch the media behind `descriptor` into `destination`.
    ///
    /// `media_hash` is the stable content-addressed identifier from
    /// [`media_hash`]; implementations use it for dedup and resume.
    /// Returns the final output path.
    async fn download(
        &self,
        descriptor: &AttachmentDescriptor,
        media_hash: &str,
        destination: &Path,
    ) -> Result<PathBuf>;
}

/// Stable content-addressed identifier for a media unique id.
///
/// Same input, same output, across runs and machines — output paths and
/// dedup keys depend on it.
pub fn media_hash(media_id: &str) -> String {
    let digest = Sha256::digest(media_id.as_bytes());
    let mut out = String::with_capacity(HASH_PREFIX_LEN * 2);
    for byte in &digest[..HASH_PREFIX_LEN] {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Build the destination path for one attachment:
/// `{root}/messages/{YYYY-MM-DD}/{hash}.{ext}`, dated from the owning
/// message's timestamp.
pub fn build_output_path(
    root: &Path,
    descriptor: &AttachmentDescriptor,
    media_hash: &str,
    timestamp_ms: i64,
) -> PathBuf {
    use chrono::TimeZone;

    let day = chrono::Utc
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "undated".to_string());

    root.join("messages")
        .join(day)
        .join(format!("{media_hash}.{}", descriptor.media_type.extension()))
}
