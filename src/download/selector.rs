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


//! Variant selection
//!
//! Pure functions over a resolved variant list. Identical inputs always pick
//! the identical `format_id`: every tie is broken down to the format id.
//!
//! # Video
//! Container must match, a video codec must be present, and the quality must
//! match exactly. There is no nearest-fit fallback: a missing tier is
//! "not found".
//!
//! # Audio
//! Container must match and an audio codec must be present. Ranking:
//! 1. the default audio track
//! 2. variants with a declared size over unsized ones
//! 3. the largest declared size (proxy for bitrate)

use crate::api::models::{MediaKind, StreamVariant};
use crate::error::{BacktrackError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Container the playback layer can handle
pub const PLAYABLE_CONTAINER: &str = "webm";

/// Requested video quality
///
/// Parsed from strings: `"360"` or `"360p"` is a height, anything else is a
/// tier label such as `"medium"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreference {
    Tier(String),
    Height(u32),
}

impl QualityPreference {
    pub fn matches(&self, variant: &StreamVariant) -> bool {
        match self {
            QualityPreference::Tier(tier) => variant.quality_tier.as_deref() == Some(tier.as_str()),
            QualityPreference::Height(height) => variant.height == Some(*height),
        }
    }
}

impl FromStr for QualityPreference {
    type Err = BacktrackError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BacktrackError::InvalidInput("Empty quality".to_string()));
        }
        let digits = s.strip_suffix('p').unwrap_or(s);
        match digits.parse::<u32>() {
            Ok(height) => Ok(QualityPreference::Height(height)),
            Err(_) => Ok(QualityPreference::Tier(s.to_string())),
        }
    }
}

impl From<&str> for QualityPreference {
    fn from(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| QualityPreference::Tier(s.to_string()))
    }
}

impl fmt::Display for QualityPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityPreference::Tier(tier) => f.write_str(tier),
            QualityPreference::Height(height) => write!(f, "{}p", height),
        }
    }
}

/// What to select from a variant list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub kind: MediaKind,
    /// Required for video, ignored for audio
    pub quality: Option<QualityPreference>,
    /// Explicit track preference; when set only this variant is eligible
    pub format_id: Option<String>,
    pub container: String,
}

impl SelectionRequest {
    pub fn video(quality: QualityPreference) -> Self {
        Self {
            kind: MediaKind::Video,
            quality: Some(quality),
            format_id: None,
            container: PLAYABLE_CONTAINER.to_string(),
        }
    }

    pub fn audio() -> Self {
        Self {
            kind: MediaKind::Audio,
            quality: None,
            format_id: None,
            container: PLAYABLE_CONTAINER.to_string(),
        }
    }

    pub fn with_format_id<S: Into<String>>(mut self, format_id: S) -> Self {
        self.format_id = Some(format_id.into());
        self
    }

    pub fn with_container<S: Into<String>>(mut self, container: S) -> Self {
        self.container = container.into();
        self
    }

    fn accepts(&self, variant: &StreamVariant) -> bool {
        if variant.container != self.container {
            return false;
        }
        if let Some(ref format_id) = self.format_id {
            if variant.format_id != *format_id {
                return false;
            }
        }
        match self.kind {
            MediaKind::Video => {
                variant.has_video()
                    && self.quality.as_ref().map_or(true, |q| q.matches(variant))
            }
            MediaKind::Audio => variant.has_audio(),
        }
    }
}

/// Pick exactly one variant for `request`, or `None`
pub fn select<'a>(variants: &'a [StreamVariant], request: &SelectionRequest) -> Option<&'a StreamVariant> {
    let rank = match request.kind {
        MediaKind::Video => rank_video,
        MediaKind::Audio => rank_audio,
    };
    variants
        .iter()
        .filter(|v| request.accepts(v))
        .max_by(|a, b| rank(a, b))
}

/// Like [`select`], but "not found" is a `NoMatchingVariant` error
pub fn select_required<'a>(
    variants: &'a [StreamVariant],
    request: &SelectionRequest,
) -> Result<&'a StreamVariant> {
    select(variants, request).ok_or_else(|| BacktrackError::NoMatchingVariant {
        kind: request.kind,
        quality: request.quality.as_ref().map(|q| q.to_string()),
    })
}

/// Video variant in the playable container at exactly `quality`
pub fn select_video<'a>(variants: &'a [StreamVariant], quality: &str) -> Option<&'a StreamVariant> {
    select(variants, &SelectionRequest::video(QualityPreference::from(quality)))
}

/// Best audio variant in the playable container
pub fn select_audio(variants: &[StreamVariant]) -> Option<&StreamVariant> {
    select(variants, &SelectionRequest::audio())
}

fn rank_video(a: &StreamVariant, b: &StreamVariant) -> Ordering {
    a.byte_size
        .is_some()
        .cmp(&b.byte_size.is_some())
        .then_with(|| a.byte_size.cmp(&b.byte_size))
        .then_with(|| b.format_id.cmp(&a.format_id))
}

fn rank_audio(a: &StreamVariant, b: &StreamVariant) -> Ordering {
    let is_default = |v: &StreamVariant| v.is_default_audio_track.unwrap_or(false);
    is_default(a)
        .cmp(&is_default(b))
        .then_with(|| a.byte_size.is_some().cmp(&b.byte_size.is_some()))
        .then_with(|| a.byte_size.cmp(&b.byte_size))
        .then_with(|| b.format_id.cmp(&a.format_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::CODEC_NONE;

    fn video(format_id: &str, tier: &str, height: u32, size: Option<u64>) -> StreamVariant {
        StreamVariant {
            format_id: format_id.to_string(),
            container: "webm".to_string(),
            audio_codec: CODEC_NONE.to_string(),
            video_codec: "vp9".to_string(),
            width: Some(height * 16 / 9),
            height: Some(height),
            quality_tier: Some(tier.to_string()),
            byte_size: size,
            fetch_url: format!("https://cdn.example/{}", format_id),
            is_default_audio_track: None,
        }
    }

    fn audio(format_id: &str, size: Option<u64>, default: Option<bool>) -> StreamVariant {
        StreamVariant {
            format_id: format_id.to_string(),
            container: "webm".to_string(),
            audio_codec: "opus".to_string(),
            video_codec: CODEC_NONE.to_string(),
            width: None,
            height: None,
            quality_tier: Some("tiny".to_string()),
            byte_size: size,
            fetch_url: format!("https://cdn.example/{}", format_id),
            is_default_audio_track: default,
        }
    }

    #[test]
    fn test_video_exact_tier_match() {
        let variants = vec![
            video("248", "high", 1080, Some(90_000_000)),
            video("243", "medium", 360, Some(5_000_000)),
        ];
        assert_eq!(select_video(&variants, "medium").unwrap().format_id, "243");
        assert_eq!(select_video(&variants, "high").unwrap().format_id, "248");
    }

    #[test]
    fn test_video_missing_tier_fails_closed() {
        let variants = vec![video("248", "high", 1080, Some(90_000_000))];
        assert!(select_video(&variants, "medium").is_none());
    }

    #[test]
    fn test_video_ignores_other_containers_and_audio_only() {
        let mut mp4 = video("134", "medium", 360, Some(4_000_000));
        mp4.container = "mp4".to_string();
        let mut variants = vec![mp4, audio("251", Some(3_000_000), None)];
        variants[1].quality_tier = Some("medium".to_string());

        assert!(select_video(&variants, "medium").is_none());

        let request = SelectionRequest::video("medium".into()).with_container("mp4");
        assert_eq!(select(&variants, &request).unwrap().format_id, "134");
    }

    #[test]
    fn test_video_by_height() {
        let variants = vec![
            video("243", "medium", 360, Some(5_000_000)),
            video("247", "hd720", 720, Some(20_000_000)),
        ];
        assert_eq!(select_video(&variants, "720p").unwrap().format_id, "247");
        assert_eq!(select_video(&variants, "360").unwrap().format_id, "243");
        assert!(select_video(&variants, "480").is_none());
    }

    #[test]
    fn test_audio_prefers_default_track() {
        let variants = vec![
            audio("251", Some(9_000_000), Some(false)),
            audio("250", Some(2_000_000), Some(true)),
        ];
        assert_eq!(select_audio(&variants).unwrap().format_id, "250");
    }

    #[test]
    fn test_audio_prefers_largest_size() {
        let variants = vec![
            audio("249", Some(1_000_000), None),
            audio("251", Some(3_000_000), None),
            audio("250", Some(2_000_000), None),
        ];
        assert_eq!(select_audio(&variants).unwrap().format_id, "251");
    }

    #[test]
    fn test_audio_unsized_only_when_no_sized_alternative() {
        let variants = vec![audio("251", None, None), audio("249", Some(10), None)];
        assert_eq!(select_audio(&variants).unwrap().format_id, "249");

        let variants = vec![audio("251", None, None)];
        assert_eq!(select_audio(&variants).unwrap().format_id, "251");
    }

    #[test]
    fn test_audio_not_found() {
        let variants = vec![video("243", "medium", 360, Some(5_000_000))];
        assert!(select_audio(&variants).is_none());

        let err = select_required(&variants, &SelectionRequest::audio()).unwrap_err();
        assert!(matches!(err, BacktrackError::NoMatchingVariant { kind: MediaKind::Audio, .. }));
    }

    #[test]
    fn test_explicit_format_preference() {
        let variants = vec![
            audio("251", Some(3_000_000), None),
            audio("249", Some(1_000_000), None),
        ];
        let request = SelectionRequest::audio().with_format_id("249");
        assert_eq!(select(&variants, &request).unwrap().format_id, "249");

        let request = SelectionRequest::audio().with_format_id("243");
        assert!(select(&variants, &request).is_none());
    }

    #[test]
    fn test_selection_is_deterministic() {
        let variants = vec![
            audio("251", Some(3_000_000), None),
            audio("171", Some(3_000_000), None),
            video("243", "medium", 360, Some(5_000_000)),
            video("244", "medium", 480, Some(5_000_000)),
        ];
        let mut reversed = variants.clone();
        reversed.reverse();

        for _ in 0..10 {
            assert_eq!(select_audio(&variants).unwrap().format_id, "171");
            assert_eq!(select_audio(&reversed).unwrap().format_id, "171");
            assert_eq!(select_video(&variants, "medium").unwrap().format_id, "243");
            assert_eq!(select_video(&reversed, "medium").unwrap().format_id, "243");
        }
    }

    #[test]
    fn test_quality_preference_parsing() {
        assert_eq!("medium".parse::<QualityPreference>().unwrap(), QualityPreference::Tier("medium".to_string()));
        assert_eq!("720p".parse::<QualityPreference>().unwrap(), QualityPreference::Height(720));
        assert_eq!("360".parse::<QualityPreference>().unwrap(), QualityPreference::Height(360));
        assert!("".parse::<QualityPreference>().is_err());
        assert_eq!(QualityPreference::Height(720).to_string(), "720p");
    }
}
