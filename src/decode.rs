//! Turns the compressed payload of an upload into a report document.

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};
use tokio::task::spawn_blocking;
use tracing::{debug, instrument};

/// Decompress a gzip buffer on the blocking thread pool. Every member
/// of a concatenated gzip stream is decompressed, in order.
pub async fn gunzip(content: Vec<u8>) -> Result<Vec<u8>> {
    spawn_blocking(move || -> Result<Vec<u8>> {
        let mut decoder = MultiGzDecoder::new(content.as_slice());
        let mut data = Vec::new();
        decoder
            .read_to_end(&mut data)
            .context("Failed to decompress gzip payload")?;
        Ok(data)
    })
    .await
    .context("Decompression task was aborted")?
}

/// Compress a buffer with gzip on the blocking thread pool.
pub async fn gzip(content: Vec<u8>) -> Result<Vec<u8>> {
    spawn_blocking(move || -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&content)
            .context("Failed to compress payload")?;
        encoder.finish().context("Failed to compress payload")
    })
    .await
    .context("Compression task was aborted")?
}

/// Decompress, decode as UTF-8 and parse as JSON.
#[instrument(skip(content), fields(compressed_len = content.len()))]
pub async fn decode_report(content: Vec<u8>) -> Result<Value> {
    let data = gunzip(content).await?;
    debug!(decompressed_len = data.len(), "decompressed report");
    let text = String::from_utf8(data).context("Report payload is not valid UTF-8")?;
    serde_json::from_str(&text).context("Report payload is not valid JSON")
}
