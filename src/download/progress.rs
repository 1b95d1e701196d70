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


//! Download progress tracking and reporting
//!
//! # Progress Information
//! - Bytes downloaded / total bytes
//! - Signed delta of the event that produced the snapshot
//! - Current speed (bytes/s) with moving average
//! - Estimated time remaining
//! - Percentage complete
//!
//! `downloaded_bytes` only ever decreases through a negative delta, which the
//! fetcher emits once when a chunk permanently fails, retracting the bytes
//! that chunk had reported.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Progress snapshot for a single fetch or a whole acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Bytes downloaded so far
    pub downloaded_bytes: u64,

    /// Total bytes to download (0 if unknown)
    pub total_bytes: u64,

    /// Percentage complete (0.0 - 100.0)
    pub percent: f64,

    /// Change in `downloaded_bytes` carried by this event
    pub delta: i64,

    /// Current download speed in bytes per second
    pub bytes_per_second: f64,

    /// Estimated time remaining in seconds (0 if unknown)
    pub eta_seconds: u64,
}

impl DownloadProgress {
    /// Create a new progress snapshot
    pub fn new(total_bytes: u64) -> Self {
        Self {
            downloaded_bytes: 0,
            total_bytes,
            percent: 0.0,
            delta: 0,
            bytes_per_second: 0.0,
            eta_seconds: 0,
        }
    }

    /// Calculate percentage from bytes
    pub fn calculate_percentage(&mut self) {
        if self.total_bytes > 0 {
            self.percent = (self.downloaded_bytes as f64 / self.total_bytes as f64) * 100.0;
        } else {
            self.percent = 0.0;
        }
    }

    /// Calculate ETA from speed and remaining bytes
    pub fn calculate_eta(&mut self) {
        if self.bytes_per_second > 0.0 && self.total_bytes > 0 {
            let remaining_bytes = self.total_bytes.saturating_sub(self.downloaded_bytes);
            self.eta_seconds = (remaining_bytes as f64 / self.bytes_per_second) as u64;
        } else {
            self.eta_seconds = 0;
        }
    }

    /// Format download speed as human-readable string (e.g., "2.5 MB/s")
    pub fn speed_string(&self) -> String {
        let mb_per_sec = self.bytes_per_second / 1_000_000.0;
        format!("{:.1} MB/s", mb_per_sec)
    }

    /// Format bytes as human-readable string (e.g., "45.2 MB")
    pub fn bytes_string(bytes: u64) -> String {
        let mb = bytes as f64 / 1_000_000.0;
        format!("{:.1} MB", mb)
    }

    /// Format progress as display string, e.g. for a toast description
    pub fn display_string(&self) -> String {
        format!(
            "Downloading... {}% ({} / {}) - {}",
            self.percent.round() as u64,
            Self::bytes_string(self.downloaded_bytes),
            Self::bytes_string(self.total_bytes),
            self.speed_string()
        )
    }
}

/// Speed tracker with moving average
///
/// Uses a sliding window approach to smooth out network fluctuations
#[derive(Debug)]
pub struct SpeedTracker {
    /// Samples within the time window
    samples: VecDeque<SpeedSample>,

    /// Time window for averaging (default 10 seconds)
    window_duration: Duration,
}

#[derive(Debug, Clone)]
struct SpeedSample {
    timestamp: Instant,

    /// Total bytes at this point in time
    position: u64,
}

impl SpeedTracker {
    /// Create new speed tracker with default 10-second window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(10))
    }

    /// Create new speed tracker with custom window
    pub fn with_window(window_duration: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window_duration,
        }
    }

    /// Add a position sample (total bytes downloaded so far)
    pub fn add_position(&mut self, position: u64) {
        let now = Instant::now();

        self.samples.push_back(SpeedSample {
            timestamp: now,
            position,
        });

        // Remove samples outside the window
        while let Some(sample) = self.samples.front() {
            if now.duration_since(sample.timestamp) > self.window_duration {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Get current average speed in bytes per second
    pub fn average_speed(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }

        let bytes_delta = last.position.saturating_sub(first.position);
        let time_delta = last.timestamp.duration_since(first.timestamp).as_secs_f64();

        if time_delta > 0.0 {
            bytes_delta as f64 / time_delta
        } else {
            0.0
        }
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Running total fed with signed deltas
///
/// Every delta produces a snapshot; there is no throttling, so a caller
/// summing `delta` always agrees with `downloaded_bytes`.
#[derive(Debug)]
pub struct ProgressTracker {
    progress: DownloadProgress,
    speed_tracker: SpeedTracker,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            progress: DownloadProgress::new(total_bytes),
            speed_tracker: SpeedTracker::new(),
        }
    }

    /// Apply a signed delta and return the resulting snapshot
    pub fn apply(&mut self, delta: i64) -> DownloadProgress {
        let downloaded = self.progress.downloaded_bytes as i64 + delta;
        self.progress.downloaded_bytes = downloaded.max(0) as u64;
        self.progress.delta = delta;

        self.speed_tracker.add_position(self.progress.downloaded_bytes);
        self.progress.bytes_per_second = self.speed_tracker.average_speed();
        self.progress.calculate_percentage();
        self.progress.calculate_eta();

        self.progress.clone()
    }

    /// Change the total, e.g. once a second track's size becomes known
    pub fn set_total(&mut self, total_bytes: u64) {
        self.progress.total_bytes = total_bytes;
        self.progress.calculate_percentage();
    }
}
