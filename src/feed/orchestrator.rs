//! One refresh pass over one entity.
//!
//! Sections are evaluated in [`SectionName::EVALUATION_ORDER`]: the video
//! subset depends on the ids the feed section just discovered. Failures stay
//! local to their section; the pass persists whatever succeeded.

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::feed::fetcher::{FetchError, Upstream};
use crate::storage::{
    Database, Entity, EntityKind, SectionName, SectionTtls, SectionUpdate, StoreError,
};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Upstream reports the entity missing; its cached state was dropped.
    #[error("{kind} {id} no longer exists")]
    EntityGone { id: String, kind: EntityKind },

    /// A section required to build any feed failed and nothing is cached.
    #[error("Fetching {section} failed: {reason}")]
    UpstreamFailed { section: SectionName, reason: String },
}

/// What happened to one section during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionOutcome {
    /// Within its TTL; no request made
    Fresh,
    /// Upstream returned new content
    Updated,
    /// Upstream confirmed the cached content
    NotModified,
    /// Stale, but no video needed refetching
    NothingToFetch,
    /// Request failed; cached state kept
    Failed(String),
}

impl fmt::Display for SectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionOutcome::Fresh => f.write_str("fresh"),
            SectionOutcome::Updated => f.write_str("updated"),
            SectionOutcome::NotModified => f.write_str("not-modified"),
            SectionOutcome::NothingToFetch => f.write_str("nothing-to-fetch"),
            SectionOutcome::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Result of [`Orchestrator::refresh`].
#[derive(Debug)]
pub struct RefreshReport {
    /// Entity state after the pass (as persisted, when `saved`)
    pub entity: Entity,
    pub outcomes: Vec<(SectionName, SectionOutcome)>,
    pub saved: bool,
}

impl RefreshReport {
    pub fn outcome(&self, section: SectionName) -> Option<&SectionOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| *name == section)
            .map(|(_, outcome)| outcome)
    }

    pub fn updated_sections(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == SectionOutcome::Updated)
            .count()
    }
}

/// Drives the conditional fetch and merge of an entity's sections.
pub struct Orchestrator<U> {
    db: Database,
    upstream: U,
    ttls: SectionTtls,
}

impl<U: Upstream> Orchestrator<U> {
    pub fn new(db: Database, upstream: U, ttls: SectionTtls) -> Self {
        Self { db, upstream, ttls }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Brings every stale section of an entity up to date and persists it.
    ///
    /// # Errors
    ///
    /// - [`RefreshError::EntityGone`] when any source reports the entity missing
    /// - [`RefreshError::UpstreamFailed`] when details failed and none are cached
    /// - [`RefreshError::Store`] on database failures
    pub async fn refresh(
        &self,
        entity_id: &str,
        kind: EntityKind,
        now: DateTime<Utc>,
    ) -> Result<RefreshReport, RefreshError> {
        let mut entity = match self.db.load_entity(entity_id, kind).await {
            Ok(entity) => entity,
            Err(StoreError::NotFound { .. }) => {
                tracing::debug!(entity = %entity_id, kind = %kind, "No cached state, first fetch");
                Entity::new(entity_id, kind)
            }
            Err(e) => return Err(e.into()),
        };
        let original = entity.clone();

        let mut outcomes = Vec::with_capacity(SectionName::EVALUATION_ORDER.len());
        let mut details_failure = None;

        for section in SectionName::EVALUATION_ORDER {
            let result = match section {
                SectionName::Feed | SectionName::Details => {
                    if !entity.is_stale(section, now, &self.ttls) {
                        tracing::debug!(entity = %entity_id, section = %section, "Section fresh");
                        outcomes.push((section, SectionOutcome::Fresh));
                        continue;
                    }
                    let token = entity.freshness_token(section);
                    if section == SectionName::Feed {
                        self.upstream
                            .fetch_feed(entity.entity_ref(), token)
                            .await
                            .map(SectionUpdate::Feed)
                    } else {
                        self.upstream
                            .fetch_details(entity.entity_ref(), token)
                            .await
                            .map(SectionUpdate::Details)
                    }
                }
                SectionName::Videos => {
                    let stale = entity.is_stale(section, now, &self.ttls);
                    let discovered = entity.new_video_ids(now, self.ttls.videos);
                    if !stale && discovered.is_empty() {
                        tracing::debug!(entity = %entity_id, section = %section, "Section fresh");
                        outcomes.push((section, SectionOutcome::Fresh));
                        continue;
                    }

                    let requested = entity.expired_videos(now, self.ttls.videos);
                    if requested.is_empty() {
                        tracing::debug!(entity = %entity_id, "No videos to refetch");
                        outcomes.push((section, SectionOutcome::NothingToFetch));
                        continue;
                    }

                    tracing::debug!(
                        entity = %entity_id,
                        new = discovered.len(),
                        requested = requested.len(),
                        "Refetching videos"
                    );
                    let fetched = self
                        .upstream
                        .fetch_videos(
                            entity.entity_ref(),
                            &requested,
                            entity.freshness_token(section),
                        )
                        .await;
                    fetched.map(|result| SectionUpdate::Videos { requested, result })
                }
            };

            match result {
                Ok(update) => {
                    let outcome = if update.is_modified() {
                        SectionOutcome::Updated
                    } else {
                        SectionOutcome::NotModified
                    };
                    tracing::info!(
                        entity = %entity_id,
                        section = %section,
                        outcome = %outcome,
                        "Section refreshed"
                    );
                    entity = entity.apply_fetch_result(update, now);
                    outcomes.push((section, outcome));
                }
                Err(FetchError::Gone) => {
                    tracing::warn!(
                        entity = %entity_id,
                        kind = %kind,
                        section = %section,
                        "Entity gone upstream, dropping cached state"
                    );
                    self.db.delete_entity(entity_id, kind).await?;
                    return Err(RefreshError::EntityGone {
                        id: entity_id.to_string(),
                        kind,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        entity = %entity_id,
                        section = %section,
                        error = %e,
                        "Section refresh failed, keeping cached state"
                    );
                    if section == SectionName::Details {
                        details_failure = Some(e.to_string());
                    }
                    outcomes.push((section, SectionOutcome::Failed(e.to_string())));
                }
            }
        }

        let saved = entity != original;
        if saved {
            self.db.save_entity(&entity).await?;
        }

        if let Some(reason) = details_failure {
            if entity.details.payload.is_none() {
                return Err(RefreshError::UpstreamFailed {
                    section: SectionName::Details,
                    reason,
                });
            }
        }

        Ok(RefreshReport {
            entity,
            outcomes,
            saved,
        })
    }
}
