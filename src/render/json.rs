use serde::Serialize;
use std::sync::Arc;

use super::content::item_html;
use super::{
    check_feed, item_author, item_title, FeedFormat, FormatRenderer, RenderContext, RenderError,
    RenderOptions, RenderedFeed,
};
use crate::feed::CanonicalFeedModel;
use crate::storage::EntityRef;

const CONTENT_TYPE: &str = "application/feed+json; charset=UTF-8";
const VERSION: &str = "https://jsonfeed.org/version/1.1";

#[derive(Serialize)]
struct JsonFeed<'a> {
    version: &'static str,
    title: &'a str,
    home_page_url: &'a str,
    feed_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<&'a str>,
    authors: Vec<Author<'a>>,
    items: Vec<Item<'a>>,
}

#[derive(Serialize)]
struct Author<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Serialize)]
struct Item<'a> {
    id: &'a str,
    url: &'a str,
    title: &'a str,
    content_html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    date_published: String,
    authors: Vec<Author<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
}

/// JSON Feed 1.1.
pub struct JsonRenderer {
    context: Arc<RenderContext>,
}

impl JsonRenderer {
    pub fn new(context: Arc<RenderContext>) -> Self {
        Self { context }
    }
}

impl FormatRenderer for JsonRenderer {
    fn format(&self) -> FeedFormat {
        FeedFormat::Json
    }

    fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    fn render(
        &self,
        model: &CanonicalFeedModel,
        options: RenderOptions,
    ) -> Result<RenderedFeed, RenderError> {
        check_feed(model)?;
        let ctx = &self.context;
        let details = &model.details;
        let entity = EntityRef {
            id: &details.id,
            kind: details.kind,
        };

        let items = model
            .videos
            .iter()
            .map(|video| {
                let image = ctx.links.thumbnail(video, entity);
                Item {
                    id: &video.id,
                    url: &video.url,
                    title: item_title(video),
                    content_html: item_html(
                        video,
                        image.as_deref(),
                        options,
                        &ctx.time,
                        &ctx.date_format,
                    ),
                    image,
                    date_published: ctx.time.rfc3339(video.published_at),
                    authors: vec![Author {
                        name: item_author(video, model),
                        url: None,
                    }],
                    tags: video.tags.iter().map(String::as_str).collect(),
                }
            })
            .collect();

        let feed = JsonFeed {
            version: VERSION,
            title: &details.title,
            home_page_url: &details.url,
            feed_url: ctx
                .links
                .self_url(entity, FeedFormat::Json, options.embed_videos),
            description: Some(details.description.as_str()).filter(|d| !d.trim().is_empty()),
            icon: details.thumbnail_url.as_deref(),
            authors: vec![Author {
                name: &details.title,
                url: Some(&details.url),
            }],
            items,
        };

        Ok(RenderedFeed {
            body: serde_json::to_vec_pretty(&feed)?,
            content_type: self.content_type(),
            last_modified: model.updated_at,
        })
    }
}
