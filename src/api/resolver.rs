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


//! Stream resolver contract
//!
//! A resolver turns a content id into a fresh [`VideoInfo`]. Implementations
//! perform exactly one outbound metadata request per call and never cache:
//! fetch URLs expire and are bound to the resolving IP, so every caller that
//! needs a usable URL (including a chunk retry) calls `resolve` again.

use crate::api::models::{ContentId, VideoInfo};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Resolve `id` into its metadata and candidate stream variants
    ///
    /// # Errors
    /// - `InvalidContentId` - id rejected before any request
    /// - `MetadataRequestFailed` - transport failure or non-2xx status
    /// - `InvalidMetadata` - response failed schema validation
    async fn resolve(&self, id: &ContentId) -> Result<VideoInfo>;
}
