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


//! Shared fixtures: a range-serving HTTP server with fault injection and an
//! in-process resolver double.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

use backtrack_core::api::models::CODEC_NONE;
use backtrack_core::api::{ContentId, StreamResolver, StreamVariant, VideoInfo};
use backtrack_core::download::{DownloadProgress, FetchConfig};
use backtrack_core::{BacktrackError, Result};

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * 1024;

/// Deterministic payload; 251 is prime so a misplaced chunk never lines up
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| ((i % 251) as u8) ^ seed).collect()
}

/// Fetch settings that keep retries fast
pub fn fast_config(chunk_size: usize) -> FetchConfig {
    FetchConfig {
        chunk_size: chunk_size as u64,
        max_attempts: 5,
        attempt_timeout_ms: 2_000,
        backoff_base_ms: 5,
        max_total_bytes: 64 * MIB as u64,
        proxy_prefix: None,
    }
}

/// Downloaded byte counts of a progress stream
pub fn downloaded(events: &[DownloadProgress]) -> Vec<u64> {
    events.iter().map(|p| p.downloaded_bytes).collect()
}

pub fn net_delta(events: &[DownloadProgress]) -> i64 {
    events.iter().map(|p| p.delta).sum()
}

pub fn is_non_decreasing(values: &[u64]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

// ============================================================================
// RANGE SERVER
// ============================================================================

/// Injected failure for one request to a chunk
#[derive(Debug, Clone)]
pub enum Fault {
    /// Answer with this status and no body
    Status(StatusCode),
    /// Send this many bytes of the range, then reset the connection
    Truncate(usize),
    /// Wait this long before answering
    Stall(Duration),
    /// Answer 200 with the whole resource, as if there were no Range header
    IgnoreRange,
}

#[derive(Default)]
pub struct ServerState {
    resources: Mutex<HashMap<String, Arc<Vec<u8>>>>,
    faults: Mutex<HashMap<(String, u64), VecDeque<Fault>>>,
    expired_tokens: Mutex<HashSet<String>>,
    media_requests: AtomicUsize,
    range_log: Mutex<Vec<(String, String)>>,
    player_response: Mutex<Option<(StatusCode, String)>>,
    player_requests: Mutex<Vec<String>>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = Arc::new(ServerState::default());
        let app = Router::new()
            .route("/media/:name", get(serve_media))
            .route("/player", post(serve_player))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            _handle: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn media_url(&self, name: &str, token: &str) -> String {
        format!("{}/media/{}?token={}", self.base_url(), name, token)
    }

    pub fn player_url(&self) -> String {
        format!("{}/player", self.base_url())
    }

    pub fn add_resource(&self, name: &str, data: Vec<u8>) {
        self.state
            .resources
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::new(data));
    }

    /// Fail the next `times` requests for the range starting at `start`
    pub fn fail_chunk(&self, name: &str, start: u64, fault: Fault, times: usize) {
        let mut faults = self.state.faults.lock().unwrap();
        let queue = faults.entry((name.to_string(), start)).or_default();
        for _ in 0..times {
            queue.push_back(fault.clone());
        }
    }

    /// Requests carrying this token get a 403
    pub fn expire_token(&self, token: &str) {
        self.state.expired_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn media_requests(&self) -> usize {
        self.state.media_requests.load(Ordering::SeqCst)
    }

    /// Range headers received for `name`, in arrival order
    pub fn ranges_for(&self, name: &str) -> Vec<String> {
        self.state
            .range_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn set_player_response(&self, status: StatusCode, body: String) {
        *self.state.player_response.lock().unwrap() = Some((status, body));
    }

    pub fn player_requests(&self) -> Vec<String> {
        self.state.player_requests.lock().unwrap().clone()
    }
}

fn parse_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.strip_prefix("bytes=")?;
    let (start, end) = rest.split_once('-')?;
    let start = start.parse().ok()?;
    let end = if end.is_empty() { None } else { Some(end.parse().ok()?) };
    Some((start, end))
}

async fn serve_media(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.media_requests.fetch_add(1, Ordering::SeqCst);

    let data = state.resources.lock().unwrap().get(&name).cloned();
    let Some(data) = data else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let expired = query
        .get("token")
        .map(|t| state.expired_tokens.lock().unwrap().contains(t))
        .unwrap_or(false);
    if expired {
        return StatusCode::FORBIDDEN.into_response();
    }

    let total = data.len() as u64;
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let Some(range) = range else {
        return (
            StatusCode::OK,
            [(header::CONTENT_LENGTH, total.to_string())],
            data.to_vec(),
        )
            .into_response();
    };

    state.range_log.lock().unwrap().push((name.clone(), range.clone()));

    let Some((start, end)) = parse_range(&range) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if start >= total {
        return (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", total))],
        )
            .into_response();
    }
    let end = end.unwrap_or(total - 1).min(total - 1);
    let slice = Bytes::copy_from_slice(&data[start as usize..=end as usize]);
    let content_range = format!("bytes {}-{}/{}", start, end, total);

    let fault = state
        .faults
        .lock()
        .unwrap()
        .get_mut(&(name.clone(), start))
        .and_then(|queue| queue.pop_front());

    match fault {
        Some(Fault::Status(status)) => return status.into_response(),
        Some(Fault::Stall(delay)) => tokio::time::sleep(delay).await,
        Some(Fault::IgnoreRange) => {
            return (
                StatusCode::OK,
                [(header::CONTENT_LENGTH, total.to_string())],
                data.to_vec(),
            )
                .into_response();
        }
        Some(Fault::Truncate(len)) => {
            let head = slice.slice(..len.min(slice.len()));
            let body = futures_util::stream::unfold(0u8, move |step| {
                let head = head.clone();
                async move {
                    match step {
                        0 => Some((Ok::<Bytes, std::io::Error>(head), 1)),
                        1 => {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Some((
                                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "injected reset")),
                                2,
                            ))
                        }
                        _ => None,
                    }
                }
            });
            return (
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_RANGE, content_range),
                    (header::CONTENT_LENGTH, slice.len().to_string()),
                ],
                Body::from_stream(body),
            )
                .into_response();
        }
        None => {}
    }

    (
        StatusCode::PARTIAL_CONTENT,
        [
            (header::CONTENT_RANGE, content_range),
            (header::CONTENT_LENGTH, slice.len().to_string()),
        ],
        slice,
    )
        .into_response()
}

async fn serve_player(State(state): State<Arc<ServerState>>, body: String) -> Response {
    state.player_requests.lock().unwrap().push(body);

    let response = state.player_response.lock().unwrap().clone();
    match response {
        Some((status, json)) => (status, [(header::CONTENT_TYPE, "application/json")], json).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ============================================================================
// RESOLVER DOUBLE
// ============================================================================

/// Resolver that hands out a fresh token in every URL it returns
///
/// Call `n` (1-based) yields `token=gen{n}` for every format.
pub struct FakeResolver {
    base_url: String,
    info: VideoInfo,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeResolver {
    pub fn new(server: &TestServer, info: VideoInfo) -> Self {
        Self {
            base_url: server.base_url(),
            info,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamResolver for FakeResolver {
    async fn resolve(&self, id: &ContentId) -> Result<VideoInfo> {
        let generation = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.failing.load(Ordering::SeqCst) {
            return Err(BacktrackError::MetadataRequestFailed {
                message: "injected resolver failure".to_string(),
                status_code: Some(503),
            });
        }
        if *id != self.info.id {
            return Err(BacktrackError::InvalidContentId(id.to_string()));
        }

        let mut info = self.info.clone();
        for format in &mut info.formats {
            format.fetch_url = format!("{}/media/{}?token=gen{}", self.base_url, format.format_id, generation);
        }
        Ok(info)
    }
}

// ============================================================================
// VARIANTS
// ============================================================================

pub fn video_variant(format_id: &str, tier: &str, size: Option<u64>) -> StreamVariant {
    StreamVariant {
        format_id: format_id.to_string(),
        container: "webm".to_string(),
        audio_codec: CODEC_NONE.to_string(),
        video_codec: "vp9".to_string(),
        width: Some(640),
        height: Some(360),
        quality_tier: Some(tier.to_string()),
        byte_size: size,
        fetch_url: String::new(),
        is_default_audio_track: None,
    }
}

pub fn audio_variant(format_id: &str, size: Option<u64>, is_default: Option<bool>) -> StreamVariant {
    StreamVariant {
        format_id: format_id.to_string(),
        container: "webm".to_string(),
        audio_codec: "opus".to_string(),
        video_codec: CODEC_NONE.to_string(),
        width: None,
        height: None,
        quality_tier: Some("tiny".to_string()),
        byte_size: size,
        fetch_url: String::new(),
        is_default_audio_track: is_default,
    }
}

pub fn with_url(mut variant: StreamVariant, url: String) -> StreamVariant {
    variant.fetch_url = url;
    variant
}

pub fn video_info(id: &str, formats: Vec<StreamVariant>) -> VideoInfo {
    VideoInfo {
        id: ContentId::new(id),
        title: "Synthetic clip".to_string(),
        author: "Test Channel".to_string(),
        short_description: "Served from a local range server".to_string(),
        formats,
    }
}
