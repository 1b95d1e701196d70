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


//! Local storage
//!
//! A single SQLite database with two logical collections keyed by content id:
//! library entries and media binaries.
//!
//! # Usage Example
//! ```no_run
//! use backtrack_core::api::ContentId;
//! use backtrack_core::storage::{Database, MediaCache, MediaStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./backtrack.db").await?;
//! let store = MediaStore::new(db);
//!
//! if let Some(media) = store.get(&ContentId::new("dQw4w9WgXcQ")).await? {
//!     println!("{} bytes cached", media.byte_size());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use cache::{MediaCache, MediaStore};
pub use database::{Database, DatabaseStats};
pub use models::{CachedMedia, LibraryEntry, MediaTrack, NewLibraryEntry};
