//! Freshness and merge rules for cached entity sections.
//!
//! Everything here is pure: callers pass `now` explicitly and get a new
//! [`Entity`] back. Persisting the result is the caller's job
//! (see [`Database::save_entity`](super::Database::save_entity)).

use chrono::{DateTime, TimeDelta, Utc};

use super::types::{
    Entity, EntityDetails, FeedPayload, Section, SectionName, VideoCollection, VideoItem,
};

/// Outcome of a conditional upstream request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conditional<T> {
    /// Upstream confirmed the presented freshness token is still current
    NotModified,
    /// New content along with the token to present next time
    Modified { payload: T, token: String },
}

impl<T> Conditional<T> {
    pub fn is_modified(&self) -> bool {
        matches!(self, Conditional::Modified { .. })
    }
}

/// Time-to-live per section name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionTtls {
    pub feed: TimeDelta,
    pub details: TimeDelta,
    pub videos: TimeDelta,
}

impl SectionTtls {
    pub fn get(&self, section: SectionName) -> TimeDelta {
        match section {
            SectionName::Feed => self.feed,
            SectionName::Details => self.details,
            SectionName::Videos => self.videos,
        }
    }
}

impl Default for SectionTtls {
    fn default() -> Self {
        Self {
            feed: TimeDelta::minutes(10),
            details: TimeDelta::hours(24),
            videos: TimeDelta::hours(1),
        }
    }
}

/// A fetch result addressed to one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionUpdate {
    Feed(Conditional<FeedPayload>),
    Details(Conditional<EntityDetails>),
    Videos {
        /// Ids that were asked for; refreshed even when upstream says not-modified
        requested: Vec<String>,
        result: Conditional<Vec<VideoItem>>,
    },
}

impl SectionUpdate {
    pub fn section(&self) -> SectionName {
        match self {
            SectionUpdate::Feed(_) => SectionName::Feed,
            SectionUpdate::Details(_) => SectionName::Details,
            SectionUpdate::Videos { .. } => SectionName::Videos,
        }
    }

    pub fn is_modified(&self) -> bool {
        match self {
            SectionUpdate::Feed(r) => r.is_modified(),
            SectionUpdate::Details(r) => r.is_modified(),
            SectionUpdate::Videos { result, .. } => result.is_modified(),
        }
    }
}

// ============================================================================
// Section
// ============================================================================

impl<T> Section<T> {
    /// True when never fetched, or last checked more than `ttl` ago.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        if self.freshness_token.is_none() {
            return true;
        }
        match self.last_checked_at {
            Some(checked) => now - checked > ttl,
            None => true,
        }
    }

    /// Replace-on-modified semantics used by `feed` and `details`.
    fn apply_replace(&mut self, result: Conditional<T>, now: DateTime<Utc>) {
        if let Conditional::Modified { payload, token } = result {
            self.payload = Some(payload);
            self.freshness_token = Some(token);
        }
        self.last_checked_at = Some(now);
    }
}

// ============================================================================
// VideoCollection
// ============================================================================

impl VideoCollection {
    pub fn new(items: impl IntoIterator<Item = VideoItem>) -> Self {
        let mut collection = Self::default();
        collection.merge(items);
        collection
    }

    /// Merges a batch by id: known ids are overwritten in place, new ids are
    /// added. Returns the number of items taken from the batch.
    ///
    /// Order is re-established afterwards, so arrival order never matters.
    pub fn merge(&mut self, batch: impl IntoIterator<Item = VideoItem>) -> usize {
        let mut merged = 0;
        for item in batch {
            self.missing.remove(&item.id);
            match self.items.iter().position(|v| v.id == item.id) {
                Some(pos) => self.items[pos] = item,
                None => self.items.push(item),
            }
            merged += 1;
        }
        if merged > 0 {
            self.sort();
        }
        merged
    }

    pub fn get(&self, id: &str) -> Option<&VideoItem> {
        self.items.iter().find(|v| v.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Videos, most recently published first.
    pub fn iter(&self) -> impl Iterator<Item = &VideoItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when upstream was asked for `id` within `ttl` and did not return it.
    pub fn recently_missing(&self, id: &str, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        self.missing
            .get(id)
            .is_some_and(|requested_at| now - *requested_at <= ttl)
    }

    fn touch(&mut self, ids: &[String], now: DateTime<Utc>) {
        for item in self.items.iter_mut().filter(|v| ids.contains(&v.id)) {
            item.checked_at = now;
        }
    }

    /// Remembers requested ids the answer did not contain (deleted, private
    /// or unparseable videos).
    fn record_missing(&mut self, requested: &[String], now: DateTime<Utc>) {
        for id in requested {
            if !self.contains(id) {
                self.missing.insert(id.clone(), now);
            }
        }
    }

    fn sort(&mut self) {
        self.items.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

// ============================================================================
// Entity
// ============================================================================

impl Entity {
    pub fn last_checked_at(&self, section: SectionName) -> Option<DateTime<Utc>> {
        match section {
            SectionName::Feed => self.feed.last_checked_at,
            SectionName::Details => self.details.last_checked_at,
            SectionName::Videos => self.videos.last_checked_at,
        }
    }

    pub fn freshness_token(&self, section: SectionName) -> Option<&str> {
        match section {
            SectionName::Feed => self.feed.freshness_token.as_deref(),
            SectionName::Details => self.details.freshness_token.as_deref(),
            SectionName::Videos => self.videos.freshness_token.as_deref(),
        }
    }

    pub fn is_stale(&self, section: SectionName, now: DateTime<Utc>, ttls: &SectionTtls) -> bool {
        let ttl = ttls.get(section);
        match section {
            SectionName::Feed => self.feed.is_stale(now, ttl),
            SectionName::Details => self.details.is_stale(now, ttl),
            SectionName::Videos => self.videos.is_stale(now, ttl),
        }
    }

    /// Merges one fetch result into a copy of this entity.
    ///
    /// Not-modified only advances `last_checked_at` (plus `checked_at` of the
    /// requested videos). Modified replaces `feed` / `details` wholesale and
    /// merges `videos` by id, stamping merged videos with `now`.
    pub fn apply_fetch_result(mut self, update: SectionUpdate, now: DateTime<Utc>) -> Entity {
        match update {
            SectionUpdate::Feed(result) => {
                self.feed.apply_replace(result, now);
                if let (Some(feed), Some(videos)) = (&self.feed.payload, &mut self.videos.payload) {
                    videos.missing.retain(|id, _| feed.contains(id));
                }
            }
            SectionUpdate::Details(result) => self.details.apply_replace(result, now),
            SectionUpdate::Videos { requested, result } => {
                let videos = self.videos.payload.get_or_insert_with(VideoCollection::default);
                match result {
                    Conditional::NotModified => videos.touch(&requested, now),
                    Conditional::Modified { payload, token } => {
                        videos.merge(payload.into_iter().map(|mut item| {
                            item.checked_at = now;
                            item
                        }));
                        self.videos.freshness_token = Some(token);
                    }
                }
                videos.record_missing(&requested, now);
                self.videos.last_checked_at = Some(now);
            }
        }
        self
    }

    /// Ids listed by the feed section that have no cached video yet.
    ///
    /// Ids upstream failed to return within the last `ttl` are left out until
    /// they expire like any cached video.
    pub fn new_video_ids(&self, now: DateTime<Utc>, ttl: TimeDelta) -> Vec<String> {
        let Some(feed) = &self.feed.payload else {
            return Vec::new();
        };
        let cached = self.videos.payload.as_ref();
        feed.video_ids()
            .filter(|id| {
                !cached.is_some_and(|c| c.contains(id) || c.recently_missing(id, now, ttl))
            })
            .map(str::to_string)
            .collect()
    }

    /// Ids whose video data needs refetching.
    ///
    /// Union of ids newly discovered by the feed and cached videos (still
    /// listed by the feed, when one is cached) whose own `checked_at` is older
    /// than `ttl`. Feed order first, then cache order; no duplicates.
    pub fn expired_videos(&self, now: DateTime<Utc>, ttl: TimeDelta) -> Vec<String> {
        let mut ids = self.new_video_ids(now, ttl);

        if let Some(videos) = &self.videos.payload {
            let listed = |id: &str| {
                self.feed
                    .payload
                    .as_ref()
                    .map_or(true, |feed| feed.contains(id))
            };
            for video in videos.iter() {
                if now - video.checked_at > ttl && listed(&video.id) && !ids.contains(&video.id) {
                    ids.push(video.id.clone());
                }
            }
        }

        ids
    }
}
