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


//! Variant selection, chunked fetching and acquisition
//!
//! - `selector` - picks one video and one audio variant
//! - `chunk` - byte-range planning and `Content-Range` parsing
//! - `stream` - concurrent range fetching with per-chunk retry
//! - `progress` - progress snapshots and aggregation
//! - `manager` - cache-first acquisition of both tracks

pub mod chunk;
pub mod manager;
pub mod progress;
pub mod selector;
pub mod stream;

// Re-export commonly used types
pub use manager::{AcquiredMedia, AcquisitionConfig, AcquisitionManager, AcquisitionSource, MediaHandle};
pub use progress::DownloadProgress;
pub use selector::{select_audio, select_video, QualityPreference, SelectionRequest};
pub use stream::{ChunkedFetcher, FetchConfig};
