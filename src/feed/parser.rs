//! Decoding of upstream payloads into section payloads.
//!
//! The video feed is Atom and goes through `feed-rs`; channel, playlist and
//! video resources come from the Data API as JSON.

use chrono::{DateTime, Utc};
use feed_rs::parser;
use serde::Deserialize;
use thiserror::Error;

use crate::storage::{EntityDetails, EntityKind, EntityRef, FeedEntry, FeedPayload, VideoItem};
use crate::util::parse_duration;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const VIDEO_ID_PREFIX: &str = "yt:video:";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid video feed: {0}")]
    Feed(String),

    #[error("Invalid API response: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Video Feed
// ============================================================================

/// Extracts the video ids listed by a channel or playlist video feed.
///
/// Entries whose id cannot be recovered are skipped with a warning.
pub fn parse_video_feed(bytes: &[u8]) -> Result<FeedPayload, ParseError> {
    let feed = parser::parse(bytes).map_err(|e| ParseError::Feed(e.to_string()))?;

    let mut entries = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let video_id = entry
            .id
            .strip_prefix(VIDEO_ID_PREFIX)
            .map(str::to_string)
            .or_else(|| {
                entry
                    .links
                    .iter()
                    .find_map(|link| video_id_from_url(&link.href))
            });

        match video_id {
            Some(video_id) if !video_id.is_empty() => entries.push(FeedEntry {
                video_id,
                published_at: entry.published.or(entry.updated),
            }),
            _ => tracing::warn!(entry_id = %entry.id, "Skipping feed entry without a video id"),
        }
    }

    Ok(FeedPayload { entries })
}

fn video_id_from_url(href: &str) -> Option<String> {
    let url = url::Url::parse(href).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
}

// ============================================================================
// Data API
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Thumbnails {
    default: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
    standard: Option<Thumbnail>,
    maxres: Option<Thumbnail>,
}

impl Thumbnails {
    /// Largest available image.
    fn best(&self) -> Option<String> {
        [
            &self.maxres,
            &self.standard,
            &self.high,
            &self.medium,
            &self.default,
        ]
        .into_iter()
        .flatten()
        .next()
        .map(|t| t.url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Snippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize)]
struct DetailsResource {
    id: String,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    published_at: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct ContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource {
    id: String,
    snippet: VideoSnippet,
    #[serde(default)]
    content_details: ContentDetails,
}

/// Canonical page of a channel or playlist.
pub fn entity_url(entity: EntityRef<'_>) -> String {
    match entity.kind {
        EntityKind::Channel => format!("https://www.youtube.com/channel/{}", entity.id),
        EntityKind::Playlist => format!("https://www.youtube.com/playlist?list={}", entity.id),
    }
}

/// Decodes a `channels.list` / `playlists.list` response.
///
/// Returns `Ok(None)` when the response holds no resource for the entity,
/// which is how the API reports deleted or private channels and playlists.
pub fn parse_details(
    bytes: &[u8],
    entity: EntityRef<'_>,
) -> Result<Option<EntityDetails>, ParseError> {
    let response: ListResponse<DetailsResource> = serde_json::from_slice(bytes)?;

    Ok(response
        .items
        .into_iter()
        .find(|item| item.id == entity.id)
        .map(|item| EntityDetails {
            id: item.id,
            kind: entity.kind,
            title: item.snippet.title,
            description: item.snippet.description,
            url: entity_url(entity),
            thumbnail_url: item.snippet.thumbnails.best(),
        }))
}

/// Decodes a `videos.list` response.
///
/// Malformed fields never fail the batch: an unparseable duration is dropped
/// and a video without a valid publish date is skipped, both with a warning.
pub fn parse_videos(bytes: &[u8], checked_at: DateTime<Utc>) -> Result<Vec<VideoItem>, ParseError> {
    let response: ListResponse<VideoResource> = serde_json::from_slice(bytes)?;

    let mut videos = Vec::with_capacity(response.items.len());
    for item in response.items {
        let published_at = match DateTime::parse_from_rfc3339(&item.snippet.published_at) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!(
                    video = %item.id,
                    published_at = %item.snippet.published_at,
                    error = %e,
                    "Skipping video with invalid publish date"
                );
                continue;
            }
        };

        let duration = item
            .content_details
            .duration
            .as_deref()
            .and_then(|raw| match parse_duration(raw) {
                Ok(d) => Some(d),
                Err(e) => {
                    tracing::warn!(video = %item.id, error = %e, "Omitting video duration");
                    None
                }
            });

        videos.push(VideoItem {
            url: format!("{WATCH_URL}{}", item.id),
            id: item.id,
            title: item.snippet.title,
            author: item.snippet.channel_title,
            published_at,
            thumbnail_url: item.snippet.thumbnails.best(),
            duration,
            tags: item.snippet.tags,
            description: item.snippet.description,
            checked_at,
        });
    }

    Ok(videos)
}
