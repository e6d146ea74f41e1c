// src/download.rs
//! Chunked HTTP download of a remote feed using ranged GET requests.
use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, RANGE};
use std::io;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::DownloadConfig;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} did not report a content length")]
    UnknownLength { url: String },
    #[error("chunk {index} ({start}-{end}): expected {expected} bytes, got {got}")]
    ShortChunk {
        index: usize,
        start: u64,
        end: u64,
        expected: u64,
        got: u64,
    },
    #[error("write download: {0}")]
    Io(#[from] io::Error),
}

/// Inclusive byte range, as sent in a `Range` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

pub fn plan_chunks(total: u64, chunk_size: u64) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let count = total.div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let start = i * chunk_size;
            Chunk {
                index: i as usize,
                start,
                end: (start + chunk_size - 1).min(total - 1),
            }
        })
        .collect()
}

async fn content_length(client: &reqwest::Client, url: &str) -> Result<u64, DownloadError> {
    let resp = client.head(url).send().await?.error_for_status()?;
    resp.headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&n| n > 0)
        .ok_or_else(|| DownloadError::UnknownLength { url: url.to_string() })
}

async fn fetch_chunk(client: &reqwest::Client, url: &str, c: Chunk) -> Result<Bytes, DownloadError> {
    let resp = client
        .get(url)
        .header(RANGE, format!("bytes={}-{}", c.start, c.end))
        .send()
        .await?
        .error_for_status()?;
    let body = resp.bytes().await?;
    if body.len() as u64 != c.len() {
        return Err(DownloadError::ShortChunk {
            index: c.index,
            start: c.start,
            end: c.end,
            expected: c.len(),
            got: body.len() as u64,
        });
    }
    debug!(index = c.index, bytes = body.len(), "chunk downloaded");
    Ok(body)
}

/// Downloads `url` into `dest`, at most `cfg.concurrency` chunks in flight,
/// written in order. Returns the number of bytes written.
pub async fn download_to(url: &str, dest: &Path, cfg: &DownloadConfig) -> Result<u64, DownloadError> {
    let client = reqwest::Client::builder().timeout(cfg.timeout).build()?;

    let total = content_length(&client, url).await?;
    let chunks = plan_chunks(total, cfg.chunk_size);
    info!(url, total, chunks = chunks.len(), "download: starting");

    let mut file = tokio::fs::File::create(dest).await?;
    let mut parts = stream::iter(chunks)
        .map(|c| fetch_chunk(&client, url, c))
        .buffered(cfg.concurrency.max(1));

    let mut written = 0u64;
    while let Some(part) = parts.try_next().await? {
        file.write_all(&part).await?;
        written += part.len() as u64;
    }
    file.flush().await?;

    info!(url, dest = ?dest, written, "download: complete");
    Ok(written)
}
