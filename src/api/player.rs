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


//! Player response schema
//!
//! The upstream player endpoint answers with a large JSON document. Only the
//! fields below are read, and each one is validated before a typed
//! [`VideoInfo`] is produced:
//!
//! ```text
//! videoDetails.videoId / title / author / shortDescription   (required)
//! streamingData.adaptiveFormats[]                             (required, non-empty)
//!     itag, url, mimeType                                     (required)
//!     width, height, quality, contentLength, audioTrack       (optional)
//! ```
//!
//! `mimeType` looks like `video/webm; codecs="vp9"`. The media type gives the
//! track kind and container, the `codecs` parameter gives the codec of that
//! kind; the codec of the other kind is `"none"`.

use crate::api::models::{ContentId, StreamVariant, VideoInfo, CODEC_NONE};
use crate::error::{BacktrackError, Result};
use serde::Deserialize;

/// Maximum number of body characters kept in an `InvalidMetadata` error
const BODY_SNIPPET_LEN: usize = 800;

// ============================================================================
// RAW SCHEMA
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlayerResponse {
    playability_status: Option<RawPlayabilityStatus>,
    video_details: Option<RawVideoDetails>,
    streaming_data: Option<RawStreamingData>,
}

#[derive(Debug, Deserialize)]
struct RawPlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVideoDetails {
    video_id: String,
    title: String,
    author: String,
    short_description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStreamingData {
    #[serde(default)]
    adaptive_formats: Vec<RawFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFormat {
    itag: u32,
    url: Option<String>,
    mime_type: String,
    width: Option<u32>,
    height: Option<u32>,
    content_length: Option<String>,
    quality: Option<String>,
    audio_track: Option<RawAudioTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAudioTrack {
    audio_is_default: Option<bool>,
}

// ============================================================================
// MIME PARSING
// ============================================================================

/// Track kind, container and codec list parsed from a `mimeType` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeInfo {
    pub kind: String,
    pub container: String,
    pub codecs: Vec<String>,
}

/// Parse `video/webm; codecs="vp9"` into its parts
pub fn parse_mime_type(mime_type: &str) -> Result<MimeInfo> {
    let mut parts = mime_type.split(';');
    let media_type = parts.next().unwrap_or_default().trim();

    let (kind, container) = media_type
        .split_once('/')
        .filter(|(k, c)| !k.is_empty() && !c.is_empty())
        .ok_or_else(|| BacktrackError::invalid_metadata(format!("Malformed mimeType: {}", mime_type)))?;

    if kind != "video" && kind != "audio" {
        return Err(BacktrackError::invalid_metadata(format!(
            "Unsupported media type in mimeType: {}",
            mime_type
        )));
    }

    let codecs = parts
        .filter_map(|param| {
            let (name, value) = param.trim().split_once('=')?;
            (name.trim() == "codecs").then(|| value.trim().trim_matches('"').to_string())
        })
        .next()
        .map(|list| {
            list.split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if codecs.is_empty() {
        return Err(BacktrackError::invalid_metadata(format!(
            "mimeType carries no codecs: {}",
            mime_type
        )));
    }

    Ok(MimeInfo {
        kind: kind.to_string(),
        container: container.to_string(),
        codecs,
    })
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Parse and validate a raw player response body
///
/// # Errors
/// `InvalidMetadata` for malformed JSON, missing required fields, an empty
/// format list, or a format that violates the schema.
pub fn parse_player_response(body: &str) -> Result<VideoInfo> {
    let raw: RawPlayerResponse = serde_json::from_str(body).map_err(|e| {
        BacktrackError::InvalidMetadata {
            message: format!("Parse error: {} at line {} col {}", e, e.line(), e.column()),
            response_body: Some(snippet(body)),
        }
    })?;

    let details = match raw.video_details {
        Some(details) => details,
        None => {
            let reason = raw
                .playability_status
                .and_then(|p| p.reason.or(p.status))
                .unwrap_or_else(|| "no reason given".to_string());
            return Err(BacktrackError::InvalidMetadata {
                message: format!("Missing videoDetails ({})", reason),
                response_body: Some(snippet(body)),
            });
        }
    };

    let streaming_data = raw
        .streaming_data
        .ok_or_else(|| BacktrackError::invalid_metadata("Missing streamingData"))?;

    if streaming_data.adaptive_formats.is_empty() {
        return Err(BacktrackError::invalid_metadata("streamingData.adaptiveFormats is empty"));
    }

    let formats = streaming_data
        .adaptive_formats
        .into_iter()
        .map(convert_format)
        .collect::<Result<Vec<_>>>()?;

    Ok(VideoInfo {
        id: ContentId::new(details.video_id),
        title: details.title,
        author: details.author,
        short_description: details.short_description,
        formats,
    })
}

fn convert_format(raw: RawFormat) -> Result<StreamVariant> {
    let format_id = raw.itag.to_string();

    let fetch_url = raw.url.ok_or_else(|| {
        BacktrackError::invalid_metadata(format!("Format {} has no url", format_id))
    })?;
    url::Url::parse(&fetch_url).map_err(|e| {
        BacktrackError::invalid_metadata(format!("Format {} has an invalid url: {}", format_id, e))
    })?;

    let mime = parse_mime_type(&raw.mime_type)?;
    let (video_codec, audio_codec) = if mime.kind == "video" {
        // Muxed formats list the video codec first
        let audio = mime.codecs.get(1).cloned().unwrap_or_else(|| CODEC_NONE.to_string());
        (mime.codecs[0].clone(), audio)
    } else {
        (CODEC_NONE.to_string(), mime.codecs[0].clone())
    };

    let byte_size = raw
        .content_length
        .map(|len| parse_content_length(&format_id, &len))
        .transpose()?;

    Ok(StreamVariant {
        format_id,
        container: mime.container,
        audio_codec,
        video_codec,
        width: raw.width,
        height: raw.height,
        quality_tier: raw.quality,
        byte_size,
        fetch_url,
        is_default_audio_track: raw.audio_track.and_then(|t| t.audio_is_default),
    })
}

fn parse_content_length(format_id: &str, value: &str) -> Result<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BacktrackError::invalid_metadata(format!(
            "Format {} has a non-numeric contentLength: {}",
            format_id, value
        )));
    }
    value.parse::<u64>().map_err(|e| {
        BacktrackError::invalid_metadata(format!(
            "Format {} contentLength out of range: {}",
            format_id, e
        ))
    })
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}
