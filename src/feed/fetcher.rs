use crate::feed::parser::{parse_details, parse_video_feed, parse_videos};
use crate::storage::{Conditional, EntityDetails, EntityKind, EntityRef, FeedPayload, VideoItem};
use chrono::Utc;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_RETRIES: u32 = 3;
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Upper bound on ids per `videos.list` call, imposed by the Data API.
pub const MAX_VIDEO_IDS_PER_REQUEST: usize = 50;

/// Errors that can occur while talking to the platform.
///
/// Every variant is a failed fetch: the orchestrator leaves the section's
/// cached state untouched and records the reason.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The channel or playlist no longer exists upstream
    #[error("Entity no longer exists upstream")]
    Gone,
    /// Data API calls need a key and none is configured
    #[error("No API key configured (set YOUTUBE_API_KEY or api_key)")]
    MissingApiKey,
    /// A request URL could not be built from the configured base URL
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

// ============================================================================
// Upstream contract
// ============================================================================

/// Conditional access to the three upstream sources of an entity.
///
/// Each call presents the section's current freshness token and answers
/// `NotModified`, `Modified { payload, token }` or an error.
pub trait Upstream {
    fn fetch_feed(
        &self,
        entity: EntityRef<'_>,
        token: Option<&str>,
    ) -> impl Future<Output = Result<Conditional<FeedPayload>, FetchError>> + Send;

    fn fetch_details(
        &self,
        entity: EntityRef<'_>,
        token: Option<&str>,
    ) -> impl Future<Output = Result<Conditional<EntityDetails>, FetchError>> + Send;

    fn fetch_videos(
        &self,
        entity: EntityRef<'_>,
        video_ids: &[String],
        token: Option<&str>,
    ) -> impl Future<Output = Result<Conditional<Vec<VideoItem>>, FetchError>> + Send;
}

// ============================================================================
// HTTP client
// ============================================================================

/// Endpoints and credentials for [`ApiClient`].
pub struct ApiSettings {
    pub api_base_url: String,
    pub feed_base_url: String,
    pub api_key: Option<SecretString>,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// First backoff delay; doubles with each retry
    pub retry_base: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            feed_base_url: "https://www.youtube.com/feeds/videos.xml".to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            retry_base: Duration::from_secs(1),
        }
    }
}

/// [`Upstream`] backed by the public video feed and the Data API.
pub struct ApiClient {
    client: reqwest::Client,
    settings: ApiSettings,
}

enum RawResponse {
    NotModified,
    Body { bytes: Vec<u8>, etag: Option<String> },
}

impl ApiClient {
    pub fn new(client: reqwest::Client, settings: ApiSettings) -> Self {
        Self { client, settings }
    }

    fn api_key(&self) -> Result<&str, FetchError> {
        self.settings
            .api_key
            .as_ref()
            .map(|k| k.expose_secret())
            .ok_or(FetchError::MissingApiKey)
    }

    fn api_url(&self, resource: &str, params: &[(&str, &str)]) -> Result<Url, FetchError> {
        let base = self.settings.api_base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/{resource}"))
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("key", self.api_key()?);
        Ok(url)
    }

    /// GET with conditional headers, retries and a bounded body.
    ///
    /// `endpoint` labels log lines; API URLs carry the key and are never logged.
    async fn get(
        &self,
        endpoint: &'static str,
        url: Url,
        token: Option<&str>,
    ) -> Result<RawResponse, FetchError> {
        let mut retry_count = 0;

        loop {
            let mut request = self.client.get(url.clone());
            if let Some(token) = token {
                request = request.header(reqwest::header::IF_NONE_MATCH, token);
            }

            let response = tokio::time::timeout(self.settings.timeout, request.send())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(|e| FetchError::Network(e.without_url()))?;

            let status = response.status();

            if status == reqwest::StatusCode::NOT_MODIFIED {
                return Ok(RawResponse::NotModified);
            }

            if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
                return Err(FetchError::Gone);
            }

            // EDGE-004: Handle rate limiting with exponential backoff
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= MAX_RETRIES {
                    return Err(FetchError::RateLimited(MAX_RETRIES));
                }

                let delay = self.backoff(retry_count);
                tracing::warn!(
                    endpoint = endpoint,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );

                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            // Handle server errors (5xx) with exponential backoff
            if status.is_server_error() {
                if retry_count >= MAX_RETRIES {
                    return Err(FetchError::HttpStatus(status.as_u16()));
                }

                let delay = self.backoff(retry_count);
                tracing::warn!(
                    endpoint = endpoint,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying after delay"
                );

                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            // Remaining 4xx errors fail immediately
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            let etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            match read_limited_bytes(response, MAX_RESPONSE_SIZE).await {
                Ok(bytes) => return Ok(RawResponse::Body { bytes, etag }),
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    // EDGE-005: Handle incomplete downloads with retry and exponential backoff
                    if retry_count >= MAX_RETRIES {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }

                    let delay = self.backoff(retry_count);
                    tracing::debug!(
                        endpoint = endpoint,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        "Retrying incomplete download"
                    );

                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, retry_count: u32) -> Duration {
        self.settings.retry_base.saturating_mul(2u32.pow(retry_count))
    }
}

/// Token for a body: the upstream ETag, else a digest of the content.
fn content_token(etag: Option<String>, bytes: &[u8]) -> String {
    etag.unwrap_or_else(|| format!("{:x}", Sha256::digest(bytes)))
}

fn classify<T>(
    token: String,
    presented: Option<&str>,
    payload: impl FnOnce() -> Result<T, FetchError>,
) -> Result<Conditional<T>, FetchError> {
    if presented == Some(token.as_str()) {
        return Ok(Conditional::NotModified);
    }
    Ok(Conditional::Modified {
        payload: payload()?,
        token,
    })
}

impl Upstream for ApiClient {
    async fn fetch_feed(
        &self,
        entity: EntityRef<'_>,
        token: Option<&str>,
    ) -> Result<Conditional<FeedPayload>, FetchError> {
        let param = match entity.kind {
            EntityKind::Channel => "channel_id",
            EntityKind::Playlist => "playlist_id",
        };
        let url = Url::parse_with_params(&self.settings.feed_base_url, [(param, entity.id)])
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        match self.get("feed", url, token).await? {
            RawResponse::NotModified => Ok(Conditional::NotModified),
            RawResponse::Body { bytes, etag } => {
                classify(content_token(etag, &bytes), token, || {
                    parse_video_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
                })
            }
        }
    }

    async fn fetch_details(
        &self,
        entity: EntityRef<'_>,
        token: Option<&str>,
    ) -> Result<Conditional<EntityDetails>, FetchError> {
        let resource = match entity.kind {
            EntityKind::Channel => "channels",
            EntityKind::Playlist => "playlists",
        };
        let url = self.api_url(resource, &[("part", "snippet"), ("id", entity.id)])?;

        match self.get("details", url, token).await? {
            RawResponse::NotModified => Ok(Conditional::NotModified),
            RawResponse::Body { bytes, etag } => {
                classify(content_token(etag, &bytes), token, || {
                    parse_details(&bytes, entity)
                        .map_err(|e| FetchError::Parse(e.to_string()))?
                        .ok_or(FetchError::Gone)
                })
            }
        }
    }

    async fn fetch_videos(
        &self,
        entity: EntityRef<'_>,
        video_ids: &[String],
        token: Option<&str>,
    ) -> Result<Conditional<Vec<VideoItem>>, FetchError> {
        if video_ids.is_empty() {
            return Ok(Conditional::NotModified);
        }

        let batches: Vec<_> = video_ids.chunks(MAX_VIDEO_IDS_PER_REQUEST).collect();
        // A token describes one response; it only applies to a single batch
        let presented = if batches.len() == 1 { token } else { None };

        let checked_at = Utc::now();
        let mut videos = Vec::with_capacity(video_ids.len());
        let mut digest = Sha256::new();
        let mut single_etag = None;

        for batch in &batches {
            let ids = batch.join(",");
            let url = self.api_url("videos", &[("part", "snippet,contentDetails"), ("id", &ids)])?;

            let (bytes, etag) = match self.get("videos", url, presented).await {
                Ok(RawResponse::NotModified) => return Ok(Conditional::NotModified),
                Ok(RawResponse::Body { bytes, etag }) => (bytes, etag),
                // A missing video list is a request problem, not a missing channel
                Err(FetchError::Gone) => return Err(FetchError::HttpStatus(404)),
                Err(e) => return Err(e),
            };

            digest.update(&bytes);
            single_etag = etag;
            videos.extend(
                parse_videos(&bytes, checked_at).map_err(|e| FetchError::Parse(e.to_string()))?,
            );
        }

        let token = match single_etag.filter(|_| batches.len() == 1) {
            Some(etag) => etag,
            None => format!("{:x}", digest.finalize()),
        };

        tracing::debug!(
            entity = %entity.id,
            requested = video_ids.len(),
            received = videos.len(),
            batches = batches.len(),
            "Fetched video details"
        );

        classify(token, presented, || Ok(videos))
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::Network(e.without_url()))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: Check for incomplete response (received fewer bytes than Content-Length)
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
