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


//! HTTP client for the upstream player endpoint
//!
//! `PlayerClient` is the production [`StreamResolver`]. It wraps an injected
//! `reqwest::Client` and issues exactly one POST per `resolve` call.
//!
//! # Request shape
//! ```text
//! POST {proxy_prefix}{endpoint}
//! {
//!   "videoId": "<id>",
//!   "context": { "client": { "clientName": "ANDROID", "clientVersion": "...",
//!                            "androidSdkVersion": 30, "hl": "en" } }
//! }
//! ```
//!
//! # Retries
//! None. A failed resolution propagates immediately; the chunked fetcher
//! decides whether to call `resolve` again.

use crate::api::models::{ContentId, VideoInfo};
use crate::api::player::parse_player_response;
use crate::api::resolver::StreamResolver;
use crate::error::{BacktrackError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, ORIGIN, USER_AGENT};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Default player endpoint
pub const DEFAULT_PLAYER_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/player";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Upstream video ids are 11 characters of URL-safe base64
const CONTENT_ID_PATTERN: &str = r"^[A-Za-z0-9_-]{11}$";

/// Configuration for PlayerClient
/// Provides a builder pattern for client customization
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub endpoint: String,
    /// Prepended to the endpoint, e.g. a CORS pass-through proxy
    pub proxy_prefix: Option<String>,
    pub client_name: String,
    pub client_version: String,
    pub android_sdk_version: u32,
    pub language: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_PLAYER_ENDPOINT.to_string(),
            proxy_prefix: None,
            client_name: "ANDROID".to_string(),
            client_version: "18.11.34".to_string(),
            android_sdk_version: 30,
            language: "en".to_string(),
            user_agent: "com.google.android.youtube/18.11.34 (Linux; U; Android 11) gzip".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ResolverConfig {
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::new()
    }

    /// Full URL the metadata request is sent to
    pub fn request_url(&self) -> String {
        match self.proxy_prefix {
            Some(ref prefix) => format!("{}{}", prefix, self.endpoint),
            None => self.endpoint.clone(),
        }
    }
}

/// Builder for ResolverConfig
#[derive(Debug)]
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResolverConfig::default(),
        }
    }

    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn proxy_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.proxy_prefix = Some(prefix.into());
        self
    }

    pub fn client_version<S: Into<String>>(mut self, version: S) -> Self {
        self.config.client_version = version.into();
        self
    }

    pub fn language<S: Into<String>>(mut self, language: S) -> Self {
        self.config.language = language.into();
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn build(self) -> ResolverConfig {
        self.config
    }
}

impl Default for ResolverConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolver backed by the upstream player endpoint
#[derive(Debug, Clone)]
pub struct PlayerClient {
    /// Underlying HTTP client
    client: Client,
    config: ResolverConfig,
    id_pattern: Regex,
}

impl PlayerClient {
    /// Create a client with its own connection pool
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Self::with_client(client, config)
    }

    /// Create a client on top of an existing connection pool
    pub fn with_client(client: Client, config: ResolverConfig) -> Result<Self> {
        let id_pattern = Regex::new(CONTENT_ID_PATTERN)
            .map_err(|e| BacktrackError::internal(format!("Invalid content id pattern: {}", e)))?;

        Ok(Self {
            client,
            config,
            id_pattern,
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Check that `id` looks like an upstream video id
    pub fn validate_id(&self, id: &ContentId) -> Result<()> {
        if self.id_pattern.is_match(id.as_str()) {
            Ok(())
        } else {
            Err(BacktrackError::InvalidContentId(id.to_string()))
        }
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ORIGIN, HeaderValue::from_static("https://www.youtube.com"));
        headers.insert("x-youtube-client-name", HeaderValue::from_static("3"));
        headers.insert(
            "x-youtube-client-version",
            HeaderValue::from_str(&self.config.client_version)
                .map_err(|e| BacktrackError::InvalidInput(format!("Invalid client version: {}", e)))?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.config.user_agent)
                .map_err(|e| BacktrackError::InvalidInput(format!("Invalid user agent: {}", e)))?,
        );
        Ok(headers)
    }

    fn build_body(&self, id: &ContentId) -> serde_json::Value {
        json!({
            "videoId": id.as_str(),
            "context": {
                "client": {
                    "clientName": self.config.client_name,
                    "clientVersion": self.config.client_version,
                    "androidSdkVersion": self.config.android_sdk_version,
                    "hl": self.config.language,
                }
            }
        })
    }
}

#[async_trait]
impl StreamResolver for PlayerClient {
    async fn resolve(&self, id: &ContentId) -> Result<VideoInfo> {
        self.validate_id(id)?;

        debug!(content_id = %id, "Resolving stream variants");

        let response = self
            .client
            .post(self.config.request_url())
            .headers(self.build_headers()?)
            .json(&self.build_body(id))
            .send()
            .await
            .map_err(|e| BacktrackError::MetadataRequestFailed {
                message: format!("Player request failed: {}", e),
                status_code: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(content_id = %id, status = status.as_u16(), "Player request rejected");
            return Err(BacktrackError::MetadataRequestFailed {
                message: format!("Player endpoint answered {}: {}", status, body.chars().take(200).collect::<String>()),
                status_code: Some(status.as_u16()),
            });
        }

        let body = response.text().await.map_err(|e| BacktrackError::MetadataRequestFailed {
            message: format!("Failed to read player response body: {}", e),
            status_code: Some(status.as_u16()),
        })?;

        let info = parse_player_response(&body)?;
        if info.id != *id {
            return Err(BacktrackError::invalid_metadata(format!(
                "Player response is for {} instead of {}",
                info.id, id
            )));
        }

        debug!(content_id = %id, formats = info.formats.len(), "Resolved stream variants");
        Ok(info)
    }
}

// ===== TESTS =====
