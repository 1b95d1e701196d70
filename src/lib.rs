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


//! Offline media fetch and cache engine
//!
//! Resolves a content id to its stream variants, downloads the selected video
//! and audio tracks as independently retried byte ranges, and keeps the
//! assembled bytes in a local SQLite cache for offline playback.
//!
//! ```no_run
//! use backtrack_core::api::{ContentId, PlayerClient, ResolverConfig};
//! use backtrack_core::download::{AcquisitionConfig, AcquisitionManager};
//! use backtrack_core::storage::{Database, MediaStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> backtrack_core::Result<()> {
//! let resolver = Arc::new(PlayerClient::new(ResolverConfig::default())?);
//! let store = Arc::new(MediaStore::new(Database::new("./backtrack.db").await?));
//! let manager = AcquisitionManager::new(
//!     reqwest::Client::new(),
//!     resolver,
//!     store,
//!     AcquisitionConfig::default(),
//! );
//!
//! let id = ContentId::new("dQw4w9WgXcQ");
//! let media = manager.acquire(&id, &manager.default_quality()).await?;
//! println!("{} + {} bytes", media.video.len(), media.audio.len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod download;
pub mod error;
pub mod storage;

pub use error::{BacktrackError, ErrorCategory, Result};
