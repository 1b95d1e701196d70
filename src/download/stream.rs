// Backtrack - Offline Media Library Client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Chunked in-memory HTTP fetching with per-chunk retry
//!
//! # Key Features
//! - Total size from the variant, or from a `bytes=0-0` probe
//! - All chunks requested concurrently on the calling task
//! - Each chunk retried independently with exponential backoff
//! - Fresh fetch URL from the resolver before every retry after the first
//! - Progress aggregated over a channel, never through shared counters
//!
//! # Retry Mechanism
//! 1. Attempt 0 uses the URL the variant was resolved with
//! 2. Attempt 1 reuses it after `backoff_base * 2^0`
//! 3. Attempts 2.. first re-resolve the content id and look the variant up by
//!    `format_id`; if that fails the last known URL is kept
//! 4. After `max_attempts` failures the chunk retracts everything it reported
//!    and the whole fetch fails
//!
//! # Progress
//! A chunk reports only bytes beyond its own high-water mark, so a retried
//! chunk never double-counts and a fetch without failures is monotonic.

use crate::api::models::{ContentId, StreamVariant};
use crate::api::resolver::StreamResolver;
use crate::download::chunk::{parse_content_range_total, plan_chunks, ChunkRange, DEFAULT_CHUNK_SIZE, PROBE_RANGE};
use crate::download::progress::{DownloadProgress, ProgressTracker};
use crate::error::{BacktrackError, Result};
use futures_util::future::join_all;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 18_000;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
const DEFAULT_MAX_TOTAL_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Attempts from this index on refresh the fetch URL first
const REFRESH_FROM_ATTEMPT: u32 = 2;

/// Fetcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Bytes per range request
    pub chunk_size: u64,

    /// Attempts per chunk, including the first
    pub max_attempts: u32,

    /// Timeout of a single chunk attempt in milliseconds
    pub attempt_timeout_ms: u64,

    /// Backoff after failed attempt `n` is `backoff_base_ms * 2^n`
    pub backoff_base_ms: u64,

    /// Largest total size a variant may declare; the whole variant is held in memory
    pub max_total_bytes: u64,

    /// Prepended to every fetch URL, e.g. a pass-through proxy
    pub proxy_prefix: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout_ms: DEFAULT_ATTEMPT_TIMEOUT_MS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            proxy_prefix: None,
        }
    }
}

impl FetchConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Delay before the attempt following failed attempt `attempt`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }

    fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn proxied(&self, url: &str) -> String {
        match self.proxy_prefix {
            Some(ref prefix) => format!("{}{}", prefix, url),
            None => url.to_string(),
        }
    }
}

/// Downloads one variant into memory
///
/// The HTTP client and the resolver are injected; nothing here is global.
pub struct ChunkedFetcher {
    client: Client,
    resolver: Arc<dyn StreamResolver>,
    config: FetchConfig,
}

impl ChunkedFetcher {
    pub fn new(client: Client, resolver: Arc<dyn StreamResolver>, config: FetchConfig) -> Self {
        Self {
            client,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch `variant` of `content_id` and return its bytes
    ///
    /// `on_progress` receives one snapshot per reported delta, always before
    /// this future resolves.
    ///
    /// # Errors
    /// - `SizeUnknown` - no declared size and the probe yielded none
    /// - `SizeLimitExceeded` - the size is above `max_total_bytes`
    /// - `ChunkFailed` - a chunk exhausted its attempts
    pub async fn fetch<F>(
        &self,
        variant: &StreamVariant,
        content_id: &ContentId,
        mut on_progress: F,
    ) -> Result<Vec<u8>>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let total = match variant.byte_size {
            Some(size) => size,
            None => self.probe_size(variant, content_id).await?,
        };
        if total > self.config.max_total_bytes {
            warn!(
                content_id = %content_id,
                format_id = %variant.format_id,
                total,
                limit = self.config.max_total_bytes,
                "Variant size above limit"
            );
            return Err(BacktrackError::SizeLimitExceeded {
                format_id: variant.format_id.clone(),
                total,
                limit: self.config.max_total_bytes,
            });
        }
        let chunks = plan_chunks(total, self.config.chunk_size)?;
        let whole = chunks.len() == 1;

        info!(
            content_id = %content_id,
            format_id = %variant.format_id,
            total,
            chunks = chunks.len(),
            "Fetching variant"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<i64>();
        let downloads = join_all(
            chunks
                .iter()
                .map(|chunk| self.fetch_chunk(*chunk, whole, variant, content_id, tx.clone())),
        );
        // Only the chunk futures hold senders now, so the drain ends with them
        drop(tx);

        let mut tracker = ProgressTracker::new(total);
        let drain = async {
            while let Some(delta) = rx.recv().await {
                on_progress(tracker.apply(delta));
            }
        };

        let (results, ()) = tokio::join!(downloads, drain);

        let mut buffer = Vec::with_capacity(total as usize);
        for result in results {
            buffer.extend_from_slice(&result?);
        }

        if buffer.len() as u64 != total {
            return Err(BacktrackError::FileSizeMismatch {
                expected: total,
                actual: buffer.len() as u64,
            });
        }

        info!(content_id = %content_id, format_id = %variant.format_id, total, "Variant fetched");
        Ok(buffer)
    }

    /// Ask the server for the total size with a one-byte range request
    async fn probe_size(&self, variant: &StreamVariant, content_id: &ContentId) -> Result<u64> {
        debug!(content_id = %content_id, format_id = %variant.format_id, "Probing variant size");

        let unknown = || BacktrackError::SizeUnknown {
            format_id: variant.format_id.clone(),
        };

        let request = self
            .client
            .get(self.config.proxied(&variant.fetch_url))
            .header(RANGE, PROBE_RANGE)
            .send();

        let response = match tokio::time::timeout(self.config.attempt_timeout(), request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(content_id = %content_id, format_id = %variant.format_id, error = %e, "Size probe failed");
                return Err(unknown());
            }
            Err(_) => {
                warn!(content_id = %content_id, format_id = %variant.format_id, "Size probe timed out");
                return Err(unknown());
            }
        };

        let from_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        let total = match (response.status(), from_range) {
            (StatusCode::PARTIAL_CONTENT, Some(total)) => Some(total),
            // Server ignored the range and sent everything
            (StatusCode::OK, _) => response.content_length(),
            // Empty resource: `Content-Range: bytes */0`
            (StatusCode::RANGE_NOT_SATISFIABLE, Some(0)) => Some(0),
            _ => None,
        };

        total.ok_or_else(unknown)
    }

    /// Download one chunk, retrying until it succeeds or attempts run out
    ///
    /// `whole` marks the only chunk of a variant, where a plain 200 is as good
    /// as a 206.
    async fn fetch_chunk(
        &self,
        chunk: ChunkRange,
        whole: bool,
        variant: &StreamVariant,
        content_id: &ContentId,
        progress: UnboundedSender<i64>,
    ) -> Result<Vec<u8>> {
        let max_attempts = self.config.effective_attempts();
        let mut url = variant.fetch_url.clone();
        let mut reported = 0u64;
        let mut attempts = 0u32;
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt >= REFRESH_FROM_ATTEMPT {
                if let Some(fresh) = self.refresh_url(content_id, &variant.format_id, chunk.index).await {
                    url = fresh;
                }
            }

            attempts += 1;
            let outcome = tokio::time::timeout(
                self.config.attempt_timeout(),
                self.fetch_range(&url, chunk, whole, &mut reported, &progress),
            )
            .await
            .unwrap_or_else(|_| Err(BacktrackError::Timeout(self.config.attempt_timeout())));

            let error = match outcome {
                Ok(bytes) => return Ok(bytes),
                Err(e) => e,
            };

            if !error.is_retryable() {
                warn!(
                    content_id = %content_id,
                    format_id = %variant.format_id,
                    chunk = chunk.index,
                    attempt,
                    error = %error,
                    "Chunk failed with non-retryable error"
                );
                last_error = Some(error);
                break;
            }

            if attempt + 1 < max_attempts {
                let delay = self.config.backoff_delay(attempt);
                warn!(
                    content_id = %content_id,
                    format_id = %variant.format_id,
                    chunk = chunk.index,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Chunk attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            last_error = Some(error);
        }

        if reported > 0 {
            let _ = progress.send(-(reported as i64));
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt was made".to_string());
        warn!(
            content_id = %content_id,
            format_id = %variant.format_id,
            chunk = chunk.index,
            attempts,
            retracted = reported,
            "Chunk exhausted its attempts"
        );

        Err(BacktrackError::ChunkFailed {
            index: chunk.index,
            start: chunk.start,
            end: chunk.end,
            attempts,
            reason,
        })
    }

    /// One range request; reports growth past the chunk's high-water mark
    async fn fetch_range(
        &self,
        url: &str,
        chunk: ChunkRange,
        whole: bool,
        reported: &mut u64,
        progress: &UnboundedSender<i64>,
    ) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.config.proxied(url))
            .header(RANGE, chunk.range_header())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        // A 200 to a partial range means the server ignored the Range header
        let ignored_range = status == StatusCode::OK && !whole;
        if !status.is_success() || ignored_range {
            return Err(BacktrackError::UnexpectedStatusCode {
                status_code: status.as_u16(),
            });
        }

        let expected = chunk.len();
        let mut buffer = Vec::with_capacity(expected as usize);
        let mut body = response.bytes_stream();

        while let Some(piece) = body.next().await {
            let piece = piece.map_err(transport_error)?;
            buffer.extend_from_slice(&piece);

            let received = buffer.len() as u64;
            if received > expected {
                return Err(BacktrackError::FileSizeMismatch {
                    expected,
                    actual: received,
                });
            }
            if received > *reported {
                let _ = progress.send((received - *reported) as i64);
                *reported = received;
            }
        }

        if buffer.len() as u64 != expected {
            return Err(BacktrackError::FileSizeMismatch {
                expected,
                actual: buffer.len() as u64,
            });
        }

        Ok(buffer)
    }

    /// Re-resolve and return the current URL of `format_id`, if any
    async fn refresh_url(&self, content_id: &ContentId, format_id: &str, chunk: usize) -> Option<String> {
        match self.resolver.resolve(content_id).await {
            Ok(info) => match info.find_format(format_id) {
                Some(fresh) => {
                    debug!(content_id = %content_id, format_id, chunk, "Refreshed fetch URL");
                    Some(fresh.fetch_url.clone())
                }
                None => {
                    warn!(content_id = %content_id, format_id, chunk, "Format missing after re-resolution, keeping last URL");
                    None
                }
            },
            Err(e) => {
                warn!(content_id = %content_id, format_id, chunk, error = %e, "Re-resolution failed, keeping last URL");
                None
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> BacktrackError {
    BacktrackError::network_error(e.to_string(), !e.is_builder())
}
