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


//! Stream resolution
//!
//! Turns a content id into typed metadata and a list of candidate stream
//! variants with short-lived fetch URLs.

pub mod client;
pub mod models;
pub mod player;
pub mod resolver;

// Re-export commonly used types
pub use client::{PlayerClient, ResolverConfig};
pub use models::{ContentId, MediaKind, StreamVariant, VideoInfo};
pub use resolver::StreamResolver;
