use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::storage::{Entity, EntityDetails, EntityKind, VideoItem};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssembleError {
    #[error("No details cached for {kind} {id}")]
    IncompleteData { id: String, kind: EntityKind },
}

/// Format-independent view of an entity, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalFeedModel {
    pub details: EntityDetails,
    /// Most recently published first
    pub videos: Vec<VideoItem>,
    /// Latest `last_checked_at` among sections that contributed data
    pub updated_at: DateTime<Utc>,
}

/// Projects cached entity state into a [`CanonicalFeedModel`].
///
/// Never touches storage. When the feed section is cached, only videos it
/// still lists are included; a missing video section yields no items.
pub fn assemble(entity: &Entity) -> Result<CanonicalFeedModel, AssembleError> {
    let incomplete = || AssembleError::IncompleteData {
        id: entity.id.clone(),
        kind: entity.kind,
    };
    let details = entity.details.payload.clone().ok_or_else(incomplete)?;

    let videos: Vec<VideoItem> = entity
        .videos
        .payload
        .iter()
        .flat_map(|collection| collection.iter())
        .filter(|video| {
            entity
                .feed
                .payload
                .as_ref()
                .map_or(true, |feed| feed.contains(&video.id))
        })
        .cloned()
        .collect();

    let updated_at = [
        entity.feed.payload.as_ref().and(entity.feed.last_checked_at),
        entity.details.last_checked_at,
        entity
            .videos
            .payload
            .as_ref()
            .and(entity.videos.last_checked_at),
    ]
    .into_iter()
    .flatten()
    .max()
    .ok_or_else(incomplete)?;

    Ok(CanonicalFeedModel {
        details,
        videos,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::orchestrator::tests::{details, feed_of, t0, video};
    use crate::storage::{Conditional, SectionUpdate, VideoCollection};
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;

    fn entity_with_details() -> Entity {
        Entity::new("C1", EntityKind::Channel).apply_fetch_result(
            SectionUpdate::Details(Conditional::Modified {
                payload: details("Channel X"),
                token: "d1".to_string(),
            }),
            t0(),
        )
    }

    #[test]
    fn test_missing_details_is_incomplete() {
        let entity = Entity::new("C1", EntityKind::Channel);
        assert_eq!(
            assemble(&entity),
            Err(AssembleError::IncompleteData {
                id: "C1".to_string(),
                kind: EntityKind::Channel,
            })
        );
    }

    #[test]
    fn test_missing_videos_yields_empty_list() {
        let model = assemble(&entity_with_details()).unwrap();
        assert!(model.videos.is_empty());
        assert_eq!(model.updated_at, t0());
    }

    #[test]
    fn test_videos_ordered_newest_first() {
        let entity = entity_with_details().apply_fetch_result(
            SectionUpdate::Videos {
                requested: vec!["a".into(), "b".into(), "c".into()],
                result: Conditional::Modified {
                    payload: vec![
                        video("b", t0() - TimeDelta::hours(2)),
                        video("c", t0() - TimeDelta::hours(3)),
                        video("a", t0() - TimeDelta::hours(1)),
                    ],
                    token: "v".into(),
                },
            },
            t0(),
        );

        let ids: Vec<_> = assemble(&entity)
            .unwrap()
            .videos
            .into_iter()
            .map(|v| v.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_videos_dropped_from_feed_are_excluded() {
        let mut entity = entity_with_details();
        entity.feed.payload = Some(feed_of(&["v1"]));
        entity.feed.last_checked_at = Some(t0() + TimeDelta::minutes(5));
        entity.videos.payload = Some(VideoCollection::new([
            video("v1", t0()),
            video("gone", t0() - TimeDelta::days(1)),
        ]));
        entity.videos.last_checked_at = Some(t0());

        let model = assemble(&entity).unwrap();
        assert_eq!(model.videos.len(), 1);
        assert_eq!(model.videos[0].id, "v1");
        assert_eq!(model.updated_at, t0() + TimeDelta::minutes(5));
    }

    #[test]
    fn test_assemble_does_not_mutate() {
        let entity = entity_with_details();
        let before = entity.clone();
        let _ = assemble(&entity);
        assert_eq!(entity, before);
    }
}
