//! URLs this service hands out: feed self links and proxied thumbnails.

use url::Url;

use super::FeedFormat;
use crate::storage::{EntityKind, EntityRef, VideoItem};

/// Builds links under the configured public base URL.
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    public_url: Url,
    image_proxy: bool,
}

impl LinkBuilder {
    /// # Errors
    ///
    /// Fails when `public_url` is not an absolute URL with a path.
    pub fn new(public_url: &str, image_proxy: bool) -> Result<Self, url::ParseError> {
        let public_url = Url::parse(public_url)?;
        if public_url.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self {
            public_url,
            image_proxy,
        })
    }

    /// URL that serves this same document.
    pub fn self_url(&self, entity: EntityRef<'_>, format: FeedFormat, embed_videos: bool) -> String {
        let id_param = match entity.kind {
            EntityKind::Channel => "channel_id",
            EntityKind::Playlist => "playlist_id",
        };
        let mut url = self.public_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair(id_param, entity.id)
                .append_pair("format", format.as_str());
            if embed_videos {
                query.append_pair("embed_videos", "true");
            }
        }
        url.into()
    }

    /// Thumbnail for a video: the upstream image, or its proxied form when
    /// the image proxy is enabled.
    pub fn thumbnail(&self, video: &VideoItem, entity: EntityRef<'_>) -> Option<String> {
        if !self.image_proxy {
            return video.thumbnail_url.clone();
        }
        let mut url = self.public_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("thumbnail");
        }
        url.query_pairs_mut()
            .append_pair("video_id", &video.id)
            .append_pair("entity_kind", entity.kind.as_str())
            .append_pair("entity_id", entity.id);
        Some(url.into())
    }
}
