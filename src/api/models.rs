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


//! Typed metadata produced by the stream resolver
//!
//! Nothing untyped crosses the resolver boundary: raw player responses are
//! validated in [`crate::api::player`] and converted into these types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel codec value meaning "this track is absent"
pub const CODEC_NONE: &str = "none";

/// Opaque, stable identifier of a piece of media
///
/// Used as the resolver input and as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of track an acquisition needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One encoded representation of the content
///
/// `fetch_url` is time-limited and bound to the IP address that resolved it.
/// It must not outlive one fetch; retries re-resolve instead of reusing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamVariant {
    /// Unique within one resolution call (the upstream itag)
    pub format_id: String,

    /// Container / file extension, e.g. "webm" or "mp4"
    pub container: String,

    /// Audio codec, or "none"
    pub audio_codec: String,

    /// Video codec, or "none"
    pub video_codec: String,

    pub width: Option<u32>,
    pub height: Option<u32>,

    /// Quality label such as "medium" or "hd720"
    pub quality_tier: Option<String>,

    /// Declared size in bytes; `None` means the server must be probed
    pub byte_size: Option<u64>,

    #[serde(skip_serializing)]
    pub fetch_url: String,

    /// Tie-break among audio variants
    pub is_default_audio_track: Option<bool>,
}

impl StreamVariant {
    pub fn has_video(&self) -> bool {
        self.video_codec != CODEC_NONE
    }

    pub fn has_audio(&self) -> bool {
        self.audio_codec != CODEC_NONE
    }

    /// MIME type used when handing the bytes to a player
    pub fn mime_type(&self, kind: MediaKind) -> String {
        format!("{}/{}", kind.as_str(), self.container)
    }
}

/// Resolver output. Created fresh on every call, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoInfo {
    pub id: ContentId,
    pub title: String,
    pub author: String,
    pub short_description: String,
    pub formats: Vec<StreamVariant>,
}

impl VideoInfo {
    /// Locate a variant by its format id
    pub fn find_format(&self, format_id: &str) -> Option<&StreamVariant> {
        self.formats.iter().find(|f| f.format_id == format_id)
    }
}
