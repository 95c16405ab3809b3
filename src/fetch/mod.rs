//! Source loading for points and region boundaries.
//!
//! A source is either an `http(s)` URL, fetched through an [`HttpClient`],
//! or a local file path.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use tracing::debug;

/// Fetches the full body of `url` as bytes.
pub async fn fetch_bytes<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Vec<u8>> {
    let resp = client.get(url).await?;
    Ok(resp.bytes().await?.to_vec())
}

/// Returns `true` when `source` should be fetched over HTTP rather than read from disk.
pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Loads `source` from a URL or a local path. No retry on failure.
#[tracing::instrument(skip(client), fields(source = %source))]
pub async fn fetch_source<C: HttpClient + ?Sized>(client: &C, source: &str) -> Result<Vec<u8>> {
    let bytes = if is_remote(source) {
        fetch_bytes(client, source).await?
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read source file: {source}"))?
    };
    debug!(bytes = bytes.len(), "Source loaded");
    Ok(bytes)
}
