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


//! Media acquisition
//!
//! `AcquisitionManager` is the entry point the application calls to get
//! playable video and audio for a content id.
//!
//! # Acquisition Flow
//! 1. Cache lookup; a hit returns handles without any network request
//! 2. Resolve the content id
//! 3. Select video and audio; either missing fails before any download
//! 4. Fetch both tracks concurrently
//! 5. Store both tracks, then return handles
//!
//! # Single Flight
//! Only one acquisition per content id runs at a time. A second call for an
//! id already in flight fails immediately with `AcquisitionInProgress`.

use crate::api::models::{ContentId, MediaKind, StreamVariant, VideoInfo};
use crate::api::resolver::StreamResolver;
use crate::download::progress::{DownloadProgress, ProgressTracker};
use crate::download::selector::{select_required, QualityPreference, SelectionRequest, PLAYABLE_CONTAINER};
use crate::download::stream::{ChunkedFetcher, FetchConfig};
use crate::error::{BacktrackError, Result};
use crate::storage::cache::MediaCache;
use crate::storage::models::{CachedMedia, MediaTrack};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Acquisition configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Quality used when the caller does not name one
    pub default_quality: String,

    /// Container both tracks must be in
    pub container: String,

    pub fetch: FetchConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            default_quality: "medium".to_string(),
            container: PLAYABLE_CONTAINER.to_string(),
            fetch: FetchConfig::default(),
        }
    }
}

/// Playable bytes of one track
///
/// Cheap to clone; the payload is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaHandle {
    pub kind: MediaKind,
    pub mime_type: String,
    pub format_id: String,
    bytes: Arc<Vec<u8>>,
}

impl MediaHandle {
    pub fn new(kind: MediaKind, mime_type: String, format_id: String, bytes: Vec<u8>) -> Self {
        Self {
            kind,
            mime_type,
            format_id,
            bytes: Arc::new(bytes),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Where the media of an acquisition came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionSource {
    Cache,
    Network,
}

/// Result of a successful acquisition
#[derive(Debug, Clone)]
pub struct AcquiredMedia {
    pub content_id: ContentId,
    pub video: MediaHandle,
    pub audio: MediaHandle,
    pub source: AcquisitionSource,
}

impl AcquiredMedia {
    fn from_cached(media: CachedMedia, source: AcquisitionSource) -> Self {
        Self {
            content_id: ContentId::new(media.content_id),
            video: MediaHandle::new(MediaKind::Video, media.video_mime_type, media.video_format_id, media.video),
            audio: MediaHandle::new(MediaKind::Audio, media.audio_mime_type, media.audio_format_id, media.audio),
            source,
        }
    }

    pub fn byte_size(&self) -> u64 {
        (self.video.len() + self.audio.len()) as u64
    }
}

type InFlight = Arc<Mutex<HashSet<ContentId>>>;

fn lock_in_flight(in_flight: &InFlight) -> MutexGuard<'_, HashSet<ContentId>> {
    // The set stays consistent even if a holder panicked
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases the content id when the acquisition ends, however it ends
struct InFlightGuard {
    in_flight: InFlight,
    id: ContentId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_in_flight(&self.in_flight).remove(&self.id);
    }
}

/// Sums both tracks into one acquisition-level progress stream
struct ProgressAggregator<F> {
    tracker: ProgressTracker,
    video_total: u64,
    audio_total: u64,
    on_progress: F,
}

impl<F: FnMut(DownloadProgress)> ProgressAggregator<F> {
    fn record(&mut self, kind: MediaKind, snapshot: DownloadProgress) {
        let changed = match kind {
            MediaKind::Video => std::mem::replace(&mut self.video_total, snapshot.total_bytes) != snapshot.total_bytes,
            MediaKind::Audio => std::mem::replace(&mut self.audio_total, snapshot.total_bytes) != snapshot.total_bytes,
        };
        if changed {
            self.tracker.set_total(self.video_total + self.audio_total);
        }
        let aggregated = self.tracker.apply(snapshot.delta);
        (self.on_progress)(aggregated);
    }
}

/// Cache-first media acquisition
pub struct AcquisitionManager {
    resolver: Arc<dyn StreamResolver>,
    fetcher: ChunkedFetcher,
    cache: Arc<dyn MediaCache>,
    config: AcquisitionConfig,
    in_flight: InFlight,
}

impl AcquisitionManager {
    /// Create a manager
    ///
    /// `client` is used for range requests only; metadata goes through
    /// `resolver`.
    pub fn new(
        client: Client,
        resolver: Arc<dyn StreamResolver>,
        cache: Arc<dyn MediaCache>,
        config: AcquisitionConfig,
    ) -> Self {
        let fetcher = ChunkedFetcher::new(client, Arc::clone(&resolver), config.fetch.clone());

        Self {
            resolver,
            fetcher,
            cache,
            config,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Quality from the configuration
    pub fn default_quality(&self) -> QualityPreference {
        QualityPreference::from(self.config.default_quality.as_str())
    }

    /// Check whether an acquisition for `id` is currently running
    pub fn is_in_flight(&self, id: &ContentId) -> bool {
        lock_in_flight(&self.in_flight).contains(id)
    }

    /// Get playable media for `id` without progress reporting
    pub async fn acquire(&self, id: &ContentId, quality: &QualityPreference) -> Result<AcquiredMedia> {
        self.acquire_with_progress(id, quality, |_| {}).await
    }

    /// Get playable media for `id`, reporting download progress
    ///
    /// `on_progress` is only called on a cache miss, and never after this
    /// future resolves.
    ///
    /// # Errors
    /// - `AcquisitionInProgress` - another acquisition for `id` is running
    /// - Resolution, Selection, Download or Store category errors from the
    ///   respective stage; nothing is cached unless both tracks succeed
    pub async fn acquire_with_progress<F>(
        &self,
        id: &ContentId,
        quality: &QualityPreference,
        on_progress: F,
    ) -> Result<AcquiredMedia>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let _guard = self.begin(id)?;

        if let Some(media) = self.cache.get(id).await? {
            info!(content_id = %id, "Serving media from cache");
            return Ok(AcquiredMedia::from_cached(media, AcquisitionSource::Cache));
        }

        info!(content_id = %id, quality = %quality, "Cache miss, acquiring media");
        let info = self.resolver.resolve(id).await?;

        let video_request = SelectionRequest::video(quality.clone()).with_container(self.config.container.as_str());
        let audio_request = SelectionRequest::audio().with_container(self.config.container.as_str());
        let video = select_required(&info.formats, &video_request)?;
        let audio = select_required(&info.formats, &audio_request)?;

        debug!(
            content_id = %id,
            video_format = %video.format_id,
            audio_format = %audio.format_id,
            "Selected variants"
        );

        let (video_bytes, audio_bytes) = self.fetch_tracks(id, video, audio, on_progress).await?;

        let media = CachedMedia::new(
            id,
            MediaTrack {
                bytes: video_bytes,
                mime_type: video.mime_type(MediaKind::Video),
                format_id: video.format_id.clone(),
            },
            MediaTrack {
                bytes: audio_bytes,
                mime_type: audio.mime_type(MediaKind::Audio),
                format_id: audio.format_id.clone(),
            },
        );

        if let Err(e) = self.cache.put(&media).await {
            warn!(content_id = %id, error = %e, "Failed to cache acquired media");
            return Err(e);
        }

        info!(content_id = %id, bytes = media.byte_size(), "Media acquired");
        Ok(AcquiredMedia::from_cached(media, AcquisitionSource::Network))
    }

    /// Remove cached media for `id`; a missing record is not an error
    pub async fn delete_cached_media(&self, id: &ContentId) -> Result<()> {
        self.cache.delete(id).await
    }

    /// Resolve `id` and return its metadata and variants
    ///
    /// Always a fresh resolution, never cached.
    pub async fn list_formats(&self, id: &ContentId) -> Result<VideoInfo> {
        self.resolver.resolve(id).await
    }

    fn begin(&self, id: &ContentId) -> Result<InFlightGuard> {
        let mut in_flight = lock_in_flight(&self.in_flight);
        if !in_flight.insert(id.clone()) {
            warn!(content_id = %id, "Acquisition already in progress");
            return Err(BacktrackError::AcquisitionInProgress(id.clone()));
        }

        Ok(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            id: id.clone(),
        })
    }

    /// Fetch both tracks concurrently; both settle before an error is returned
    async fn fetch_tracks<F>(
        &self,
        id: &ContentId,
        video: &StreamVariant,
        audio: &StreamVariant,
        on_progress: F,
    ) -> Result<(Vec<u8>, Vec<u8>)>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let initial_total = video.byte_size.unwrap_or(0) + audio.byte_size.unwrap_or(0);
        let aggregator = Mutex::new(ProgressAggregator {
            tracker: ProgressTracker::new(initial_total),
            video_total: video.byte_size.unwrap_or(0),
            audio_total: audio.byte_size.unwrap_or(0),
            on_progress,
        });
        let report = |kind: MediaKind, snapshot: DownloadProgress| {
            aggregator
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .record(kind, snapshot);
        };

        let (video_result, audio_result) = tokio::join!(
            self.fetcher.fetch(video, id, |p| report(MediaKind::Video, p)),
            self.fetcher.fetch(audio, id, |p| report(MediaKind::Audio, p)),
        );

        Ok((video_result?, audio_result?))
    }
}
