//! Database models for Backtrack
//!
//! # SQLite Adaptations
//! - Content ids stored as TEXT primary keys
//! - Media payloads stored as BLOB
//! - DateTime stored as TEXT in ISO 8601 format

use crate::api::models::{ContentId, VideoInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// LIBRARY ENTRIES
// ============================================================================

/// Content the user added to the library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LibraryEntry {
    pub content_id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub added_at: DateTime<Utc>,
}

impl LibraryEntry {
    pub fn id(&self) -> ContentId {
        ContentId::new(self.content_id.clone())
    }
}

/// Library entry about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLibraryEntry {
    pub content_id: String,
    pub title: String,
    pub author: String,
    pub description: String,
}

impl NewLibraryEntry {
    pub fn new(content_id: &ContentId, title: String, author: String) -> Self {
        Self {
            content_id: content_id.to_string(),
            title,
            author,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = description;
        self
    }
}

impl From<&VideoInfo> for NewLibraryEntry {
    fn from(info: &VideoInfo) -> Self {
        Self::new(&info.id, info.title.clone(), info.author.clone())
            .with_description(info.short_description.clone())
    }
}

// ============================================================================
// MEDIA BINARIES
// ============================================================================

/// One assembled track ready to be stored or played
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub format_id: String,
}

/// Persisted video and audio payloads of one content id
///
/// Immutable once written; replacing a record deletes and re-inserts it.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CachedMedia {
    pub content_id: String,
    pub video: Vec<u8>,
    pub video_mime_type: String,
    pub video_format_id: String,
    pub audio: Vec<u8>,
    pub audio_mime_type: String,
    pub audio_format_id: String,
    pub cached_at: DateTime<Utc>,
}

impl CachedMedia {
    pub fn new(content_id: &ContentId, video: MediaTrack, audio: MediaTrack) -> Self {
        Self {
            content_id: content_id.to_string(),
            video: video.bytes,
            video_mime_type: video.mime_type,
            video_format_id: video.format_id,
            audio: audio.bytes,
            audio_mime_type: audio.mime_type,
            audio_format_id: audio.format_id,
            cached_at: Utc::now(),
        }
    }

    pub fn id(&self) -> ContentId {
        ContentId::new(self.content_id.clone())
    }

    /// Combined payload size of both tracks
    pub fn byte_size(&self) -> u64 {
        (self.video.len() + self.audio.len()) as u64
    }
}
