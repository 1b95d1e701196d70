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


//! Byte-range planning
//!
//! # Range Mechanism
//! 1. `[0, total)` is split into contiguous chunks of `chunk_size` bytes, the
//!    last one possibly shorter
//! 2. Each chunk is requested with `Range: bytes={start}-{end-1}`
//! 3. A size probe uses `Range: bytes=0-0` and reads the total from
//!    `Content-Range: bytes 0-0/{total}`

use crate::error::{BacktrackError, Result};

/// Default chunk size: 5 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Range header value of the size probe
pub const PROBE_RANGE: &str = "bytes=0-0";

/// One contiguous byte range of a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// Position in ascending offset order
    pub index: usize,
    /// First byte, inclusive
    pub start: u64,
    /// Last byte, exclusive
    pub end: u64,
}

impl ChunkRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// `Range` header value (HTTP ranges are inclusive on both ends)
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end.saturating_sub(1))
    }
}

/// Partition `[0, total)` into ranges of at most `chunk_size` bytes
///
/// A zero-length resource yields no chunks.
///
/// # Errors
/// `InvalidInput` if `chunk_size` is zero
pub fn plan_chunks(total: u64, chunk_size: u64) -> Result<Vec<ChunkRange>> {
    if chunk_size == 0 {
        return Err(BacktrackError::InvalidInput("Chunk size must be positive".to_string()));
    }

    let mut chunks = Vec::new();
    let mut start = 0u64;
    while start < total {
        let end = start.saturating_add(chunk_size).min(total);
        chunks.push(ChunkRange {
            index: chunks.len(),
            start,
            end,
        });
        start = end;
    }
    Ok(chunks)
}

/// Read the complete length from a `Content-Range` header value
///
/// `bytes 0-0/1234` yields `Some(1234)`; an unknown length (`*`) or a
/// malformed header yields `None`.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.split_once('/')?;
    total.trim().parse::<u64>().ok()
}
