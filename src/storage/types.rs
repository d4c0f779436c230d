use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::util::VideoDuration;

// ============================================================================
// Error Types
// ============================================================================

/// Persistence errors for cached entity state
#[derive(Debug, Error)]
pub enum StoreError {
    /// No state stored for this entity yet (first request)
    #[error("No cached state for {kind} {id}")]
    NotFound { id: String, kind: EntityKind },

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Stored state could not be (de)serialized
    #[error("Corrupt entity state: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

// ============================================================================
// Identifiers
// ============================================================================

/// Kind of tracked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Channel,
    Playlist,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Channel => "channel",
            EntityKind::Playlist => "playlist",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel" => Ok(EntityKind::Channel),
            "playlist" => Ok(EntityKind::Playlist),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// Name of an independently cached slice of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionName {
    Feed,
    Details,
    Videos,
}

impl SectionName {
    /// Order in which sections are evaluated during a refresh pass.
    ///
    /// `feed` discovers video ids that `videos` depends on, so it runs first.
    pub const EVALUATION_ORDER: [SectionName; 3] =
        [SectionName::Feed, SectionName::Details, SectionName::Videos];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionName::Feed => "feed",
            SectionName::Details => "details",
            SectionName::Videos => "videos",
        }
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Borrowed `(id, kind)` pair used when talking to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRef<'a> {
    pub id: &'a str,
    pub kind: EntityKind,
}

// ============================================================================
// Section Payloads
// ============================================================================

/// One entry of the platform's video feed for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub video_id: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Payload of the `feed` section: video ids listed upstream, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPayload {
    pub entries: Vec<FeedEntry>,
}

impl FeedPayload {
    pub fn video_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.video_id.as_str())
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.entries.iter().any(|e| e.video_id == video_id)
    }
}

/// Payload of the `details` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDetails {
    pub id: String,
    pub kind: EntityKind,
    pub title: String,
    pub description: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
}

/// A single video belonging to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoItem {
    pub id: String,
    pub title: String,
    pub author: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub thumbnail_url: Option<String>,
    /// `None` when the upstream duration could not be parsed
    pub duration: Option<VideoDuration>,
    pub tags: Vec<String>,
    pub description: String,
    /// When this video's data was last confirmed upstream
    pub checked_at: DateTime<Utc>,
}

/// Payload of the `videos` section.
///
/// Keyed by video id and kept most-recent-first by `published_at`; see
/// `storage::parts` for the merge rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoCollection {
    pub(crate) items: Vec<VideoItem>,
    /// Requested ids upstream did not return, with the time of that request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub(crate) missing: BTreeMap<String, DateTime<Utc>>,
}

// ============================================================================
// Sections and Entities
// ============================================================================

/// One independently expiring slice of cached entity state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section<T> {
    pub payload: Option<T>,
    /// Set only by a modified fetch. `None` means never fetched.
    pub freshness_token: Option<String>,
    /// Last fetch that succeeded or came back not-modified
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Self {
            payload: None,
            freshness_token: None,
            last_checked_at: None,
        }
    }
}

/// A tracked channel or playlist with its cached sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub kind: EntityKind,
    pub feed: Section<FeedPayload>,
    pub details: Section<EntityDetails>,
    pub videos: Section<VideoCollection>,
}

impl Entity {
    /// Empty state for an entity seen for the first time.
    pub fn new(id: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            feed: Section::default(),
            details: Section::default(),
            videos: Section::default(),
        }
    }

    pub fn entity_ref(&self) -> EntityRef<'_> {
        EntityRef {
            id: &self.id,
            kind: self.kind,
        }
    }
}
