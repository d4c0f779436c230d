//! Validated request parameters.
//!
//! A request names exactly one channel or playlist, an optional output
//! format and whether to embed players. Parameters arrive either as CLI
//! flags or as a CGI `QUERY_STRING`; both end up in [`RequestParameters`].

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::render::{FeedFormat, UnsupportedFormat};
use crate::storage::EntityKind;

static CHANNEL_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^UC[\w-]{22}$").unwrap());

static PLAYLIST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:PL|OL|UU|LL|FL|RD)[A-Za-z0-9_-]{10,64}$").unwrap());

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Either channel_id or playlist_id is required")]
    MissingId,

    #[error("Only one of channel_id and playlist_id may be given")]
    AmbiguousId,

    #[error("Invalid {kind} id: {id:?}")]
    InvalidId { kind: EntityKind, id: String },

    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormat),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParameters {
    pub entity_id: String,
    pub kind: EntityKind,
    /// `None` falls back to the configured default format
    pub format: Option<FeedFormat>,
    pub embed_videos: bool,
}

impl RequestParameters {
    /// Validates raw parameter values.
    pub fn new(
        channel_id: Option<&str>,
        playlist_id: Option<&str>,
        format: Option<&str>,
        embed_videos: Option<&str>,
    ) -> Result<Self, RequestError> {
        fn non_empty(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }

        let (entity_id, kind) = match (non_empty(channel_id), non_empty(playlist_id)) {
            (Some(id), None) => (id, EntityKind::Channel),
            (None, Some(id)) => (id, EntityKind::Playlist),
            (Some(_), Some(_)) => return Err(RequestError::AmbiguousId),
            (None, None) => return Err(RequestError::MissingId),
        };

        let pattern = match kind {
            EntityKind::Channel => &CHANNEL_ID,
            EntityKind::Playlist => &PLAYLIST_ID,
        };
        if !pattern.is_match(entity_id) {
            return Err(RequestError::InvalidId {
                kind,
                id: entity_id.to_string(),
            });
        }

        let format = non_empty(format)
            .map(str::parse::<FeedFormat>)
            .transpose()?;

        Ok(Self {
            entity_id: entity_id.to_string(),
            kind,
            format,
            embed_videos: non_empty(embed_videos).is_some_and(is_truthy),
        })
    }

    /// Parses a URL query string (`channel_id=...&format=atom`).
    ///
    /// Unknown keys are ignored; for repeated keys the last value wins.
    pub fn from_query(query: &str) -> Result<Self, RequestError> {
        let mut channel_id = None;
        let mut playlist_id = None;
        let mut format = None;
        let mut embed_videos = None;

        for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "channel_id" => channel_id = Some(value.into_owned()),
                "playlist_id" => playlist_id = Some(value.into_owned()),
                "format" => format = Some(value.into_owned()),
                "embed_videos" => embed_videos = Some(value.into_owned()),
                _ => {}
            }
        }

        Self::new(
            channel_id.as_deref(),
            playlist_id.as_deref(),
            format.as_deref(),
            embed_videos.as_deref(),
        )
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CHANNEL: &str = "UCabcdefghijklmnopqrstuv";

    #[test]
    fn test_channel_request() {
        let params = RequestParameters::from_query(&format!("channel_id={CHANNEL}")).unwrap();
        assert_eq!(
            params,
            RequestParameters {
                entity_id: CHANNEL.to_string(),
                kind: EntityKind::Channel,
                format: None,
                embed_videos: false,
            }
        );
    }

    #[test]
    fn test_playlist_with_options() {
        let params = RequestParameters::from_query(
            "?playlist_id=PLabcdefghijkl&format=JSON&embed_videos=on&utm_source=x",
        )
        .unwrap();
        assert_eq!(params.kind, EntityKind::Playlist);
        assert_eq!(params.format, Some(FeedFormat::Json));
        assert!(params.embed_videos);
    }

    #[test]
    fn test_embed_truthiness() {
        for (value, expected) in [
            ("1", true),
            ("true", true),
            ("YES", true),
            ("0", false),
            ("false", false),
            ("off", false),
            ("maybe", false),
        ] {
            let params = RequestParameters::new(Some(CHANNEL), None, None, Some(value)).unwrap();
            assert_eq!(params.embed_videos, expected, "embed_videos={value}");
        }
    }

    #[test]
    fn test_missing_and_ambiguous_ids() {
        assert_eq!(
            RequestParameters::from_query("format=rss"),
            Err(RequestError::MissingId)
        );
        assert_eq!(
            RequestParameters::from_query("channel_id=&playlist_id="),
            Err(RequestError::MissingId)
        );
        assert_eq!(
            RequestParameters::new(Some(CHANNEL), Some("PLabcdefghijkl"), None, None),
            Err(RequestError::AmbiguousId)
        );
    }

    #[test]
    fn test_malformed_ids_rejected() {
        for query in [
            "channel_id=UCshort",
            "channel_id=../../etc/passwd",
            "channel_id=XXabcdefghijklmnopqrstuv",
            "playlist_id=PL<script>",
        ] {
            assert!(
                matches!(
                    RequestParameters::from_query(query),
                    Err(RequestError::InvalidId { .. })
                ),
                "{query} should be rejected"
            );
        }
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(matches!(
            RequestParameters::from_query(&format!("channel_id={CHANNEL}&format=yaml")),
            Err(RequestError::UnsupportedFormat(_))
        ));
    }
}
