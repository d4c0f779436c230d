//! Serialization of a [`CanonicalFeedModel`] into syndication formats.
//!
//! Every format shares the item HTML ([`content`]) and URL policy
//! ([`links`]); the format modules only lay out the document. Renderers are
//! built once at startup and looked up through [`Renderers`].

mod atom;
pub mod content;
mod json;
pub mod links;
mod rss;
mod xml;

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::feed::CanonicalFeedModel;
use crate::storage::VideoItem;
use crate::util::TimeCodec;

pub use atom::AtomRenderer;
pub use json::JsonRenderer;
pub use links::LinkBuilder;
pub use rss::RssRenderer;

const UNTITLED: &str = "Untitled";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum RenderError {
    /// A feed-level field every format requires is empty
    #[error("Feed is missing its {0}")]
    MissingField(&'static str),

    #[error("Failed to write XML: {0}")]
    Xml(String),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unsupported feed format: {0:?} (expected rss, atom or json)")]
pub struct UnsupportedFormat(pub String);

// ============================================================================
// Formats
// ============================================================================

/// Output formats this service can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedFormat {
    Rss,
    Atom,
    Json,
}

impl FeedFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedFormat::Rss => "rss",
            FeedFormat::Atom => "atom",
            FeedFormat::Json => "json",
        }
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedFormat {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rss" => Ok(FeedFormat::Rss),
            "atom" => Ok(FeedFormat::Atom),
            "json" => Ok(FeedFormat::Json),
            _ => Err(UnsupportedFormat(s.to_string())),
        }
    }
}

// ============================================================================
// Renderer contract
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Embed a player in item content instead of a linked thumbnail
    pub embed_videos: bool,
}

/// A serialized feed document.
#[derive(Debug, Clone)]
pub struct RenderedFeed {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub last_modified: DateTime<Utc>,
}

/// Settings shared by all renderers.
#[derive(Debug)]
pub struct RenderContext {
    pub time: TimeCodec,
    /// strftime pattern for dates inside item content
    pub date_format: String,
    pub links: LinkBuilder,
}

pub trait FormatRenderer: Send + Sync {
    fn format(&self) -> FeedFormat;

    fn content_type(&self) -> &'static str;

    /// Serializes `model`. Deterministic for identical input.
    fn render(
        &self,
        model: &CanonicalFeedModel,
        options: RenderOptions,
    ) -> Result<RenderedFeed, RenderError>;
}

/// One renderer per [`FeedFormat`].
pub struct Renderers {
    rss: RssRenderer,
    atom: AtomRenderer,
    json: JsonRenderer,
}

impl Renderers {
    pub fn new(context: RenderContext) -> Self {
        let context = Arc::new(context);
        Self {
            rss: RssRenderer::new(Arc::clone(&context)),
            atom: AtomRenderer::new(Arc::clone(&context)),
            json: JsonRenderer::new(context),
        }
    }

    pub fn get(&self, format: FeedFormat) -> &dyn FormatRenderer {
        match format {
            FeedFormat::Rss => &self.rss,
            FeedFormat::Atom => &self.atom,
            FeedFormat::Json => &self.json,
        }
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Rejects models no format can represent.
fn check_feed(model: &CanonicalFeedModel) -> Result<(), RenderError> {
    if model.details.title.trim().is_empty() {
        return Err(RenderError::MissingField("title"));
    }
    if model.details.url.trim().is_empty() {
        return Err(RenderError::MissingField("url"));
    }
    Ok(())
}

fn item_title(video: &VideoItem) -> &str {
    if video.title.trim().is_empty() {
        tracing::warn!(video = %video.id, "Video has no title, using placeholder");
        UNTITLED
    } else {
        &video.title
    }
}

/// Video author, falling back to the feed's own title.
fn item_author<'a>(video: &'a VideoItem, model: &'a CanonicalFeedModel) -> &'a str {
    if video.author.trim().is_empty() {
        &model.details.title
    } else {
        &video.author
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::{EntityDetails, EntityKind};
    use crate::util::VideoDuration;
    use chrono::{TimeDelta, TimeZone};

    pub(crate) fn context(image_proxy: bool) -> RenderContext {
        RenderContext {
            time: TimeCodec::default(),
            date_format: "%Y-%m-%d %H:%M".to_string(),
            links: LinkBuilder::new("https://feeds.example.com/", image_proxy).unwrap(),
        }
    }

    pub(crate) fn model() -> CanonicalFeedModel {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 3, 9, 30, 0).unwrap();
        let video = |id: &str, published: DateTime<Utc>, title: &str| VideoItem {
            id: id.to_string(),
            title: title.to_string(),
            author: "Channel X".to_string(),
            url: format!("https://www.youtube.com/watch?v={id}"),
            published_at: published,
            thumbnail_url: Some(format!("https://i.ytimg.com/vi/{id}/maxresdefault.jpg")),
            duration: Some(VideoDuration::from_secs(253)),
            tags: vec!["rust".to_string()],
            description: "Links: https://example.com/a?b=1&c=2\nSecond line <b>".to_string(),
            checked_at: t1,
        };

        CanonicalFeedModel {
            details: EntityDetails {
                id: "UCabcdefghijklmnopqrstuv".to_string(),
                kind: EntityKind::Channel,
                title: "Channel X & Friends".to_string(),
                description: "About <us>".to_string(),
                url: "https://www.youtube.com/channel/UCabcdefghijklmnopqrstuv".to_string(),
                thumbnail_url: Some("https://yt3.ggpht.com/avatar.jpg".to_string()),
            },
            videos: vec![
                video("v1", t1, "First & best"),
                video("v2", t1 - TimeDelta::days(1), "Second"),
                video("v3", t1 - TimeDelta::days(2), ""),
            ],
            updated_at: t1 + TimeDelta::minutes(5),
        }
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("rss".parse::<FeedFormat>(), Ok(FeedFormat::Rss));
        assert_eq!("ATOM".parse::<FeedFormat>(), Ok(FeedFormat::Atom));
        assert_eq!(" json ".parse::<FeedFormat>(), Ok(FeedFormat::Json));
        assert_eq!(
            "yaml".parse::<FeedFormat>(),
            Err(UnsupportedFormat("yaml".to_string()))
        );
    }

    #[test]
    fn test_registry_maps_each_format() {
        let renderers = Renderers::new(context(false));
        let model = model();
        for format in [FeedFormat::Rss, FeedFormat::Atom, FeedFormat::Json] {
            let renderer = renderers.get(format);
            assert_eq!(renderer.format(), format);

            let rendered = renderer.render(&model, RenderOptions::default()).unwrap();
            assert_eq!(rendered.content_type, renderer.content_type());
        }
    }

    #[test]
    fn test_missing_title_is_render_error() {
        let renderers = Renderers::new(context(false));
        let mut model = model();
        model.details.title = "  ".to_string();

        for format in [FeedFormat::Rss, FeedFormat::Atom, FeedFormat::Json] {
            let err = renderers
                .get(format)
                .render(&model, RenderOptions::default())
                .unwrap_err();
            assert!(matches!(err, RenderError::MissingField("title")));
        }
    }

    #[test]
    fn test_last_modified_is_model_updated_at() {
        let renderers = Renderers::new(context(false));
        let model = model();
        for format in [FeedFormat::Rss, FeedFormat::Atom, FeedFormat::Json] {
            let rendered = renderers
                .get(format)
                .render(&model, RenderOptions::default())
                .unwrap();
            assert_eq!(rendered.last_modified, model.updated_at);
        }
    }

    #[test]
    fn test_output_is_deterministic() {
        let renderers = Renderers::new(context(true));
        let model = model();
        let options = RenderOptions { embed_videos: true };
        for format in [FeedFormat::Rss, FeedFormat::Atom, FeedFormat::Json] {
            let a = renderers.get(format).render(&model, options).unwrap();
            let b = renderers.get(format).render(&model, options).unwrap();
            assert_eq!(a.body, b.body);
        }
    }
}
