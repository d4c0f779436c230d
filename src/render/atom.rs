use quick_xml::events::BytesStart;
use std::sync::Arc;

use super::content::item_html;
use super::xml::XmlDocument;
use super::{
    check_feed, item_author, item_title, FeedFormat, FormatRenderer, RenderContext, RenderError,
    RenderOptions, RenderedFeed,
};
use crate::feed::CanonicalFeedModel;
use crate::storage::EntityRef;

const CONTENT_TYPE: &str = "application/atom+xml; charset=UTF-8";

/// Atom 1.0, with thumbnails as Media RSS extensions.
pub struct AtomRenderer {
    context: Arc<RenderContext>,
}

impl AtomRenderer {
    pub fn new(context: Arc<RenderContext>) -> Self {
        Self { context }
    }
}

fn link(rel: &str, href: &str, media_type: Option<&str>) -> BytesStart<'static> {
    let mut link = BytesStart::new("link");
    link.push_attribute(("rel", rel));
    link.push_attribute(("href", href));
    if let Some(media_type) = media_type {
        link.push_attribute(("type", media_type));
    }
    link.into_owned()
}

impl FormatRenderer for AtomRenderer {
    fn format(&self) -> FeedFormat {
        FeedFormat::Atom
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

        let mut doc = XmlDocument::new()?;

        let mut feed = BytesStart::new("feed");
        feed.push_attribute(("xmlns", "http://www.w3.org/2005/Atom"));
        feed.push_attribute(("xmlns:media", "http://search.yahoo.com/mrss/"));
        doc.start(feed)?;

        doc.text("id", &details.url)?;
        doc.text("title", &details.title)?;
        if !details.description.trim().is_empty() {
            doc.text("subtitle", &details.description)?;
        }
        doc.text("updated", &ctx.time.rfc3339(model.updated_at))?;
        doc.empty(link("alternate", &details.url, Some("text/html")))?;
        let self_url = ctx
            .links
            .self_url(entity, FeedFormat::Atom, options.embed_videos);
        doc.empty(link("self", &self_url, Some("application/atom+xml")))?;
        if let Some(image) = &details.thumbnail_url {
            doc.text("icon", image)?;
        }
        doc.open("author")?;
        doc.text("name", &details.title)?;
        doc.text("uri", &details.url)?;
        doc.close("author")?;

        for video in &model.videos {
            let thumbnail = ctx.links.thumbnail(video, entity);

            doc.open("entry")?;
            doc.text("id", &video.url)?;
            doc.text("title", item_title(video))?;
            doc.empty(link("alternate", &video.url, Some("text/html")))?;
            doc.text("published", &ctx.time.rfc3339(video.published_at))?;
            doc.text("updated", &ctx.time.rfc3339(video.published_at))?;

            doc.open("author")?;
            doc.text("name", item_author(video, model))?;
            doc.close("author")?;

            let mut content = BytesStart::new("content");
            content.push_attribute(("type", "html"));
            doc.text_with(
                content,
                &item_html(
                    video,
                    thumbnail.as_deref(),
                    options,
                    &ctx.time,
                    &ctx.date_format,
                ),
            )?;

            for tag in &video.tags {
                let mut category = BytesStart::new("category");
                category.push_attribute(("term", tag.as_str()));
                doc.empty(category)?;
            }

            if let Some(thumbnail) = &thumbnail {
                let mut media = BytesStart::new("media:thumbnail");
                media.push_attribute(("url", thumbnail.as_str()));
                doc.empty(media)?;
            }
            doc.close("entry")?;
        }

        doc.close("feed")?;

        Ok(RenderedFeed {
            body: doc.finish(),
            content_type: self.content_type(),
            last_modified: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::{context, model};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_roundtrip() {
        let renderer = AtomRenderer::new(Arc::new(context(false)));
        let model = model();
        let rendered = renderer.render(&model, RenderOptions::default()).unwrap();
        assert_eq!(rendered.content_type, "application/atom+xml; charset=UTF-8");

        let parsed = feed_rs::parser::parse(rendered.body.as_slice()).unwrap();
        assert_eq!(parsed.feed_type, feed_rs::model::FeedType::Atom);
        assert_eq!(parsed.title.unwrap().content, "Channel X & Friends");
        assert_eq!(parsed.updated, Some(model.updated_at));

        let ids: Vec<_> = parsed.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "https://www.youtube.com/watch?v=v1",
                "https://www.youtube.com/watch?v=v2",
                "https://www.youtube.com/watch?v=v3",
            ]
        );
        assert_eq!(parsed.entries[0].published, Some(model.videos[0].published_at));
        assert_eq!(parsed.entries[0].categories[0].term, "rust");
    }

    #[test]
    fn test_self_link() {
        let renderer = AtomRenderer::new(Arc::new(context(false)));
        let body = String::from_utf8(
            renderer
                .render(&model(), RenderOptions::default())
                .unwrap()
                .body,
        )
        .unwrap();
        assert!(body.contains(
            "<link rel=\"self\" href=\"https://feeds.example.com/?channel_id=UCabcdefghijklmnopqrstuv&amp;format=atom\" type=\"application/atom+xml\"/>"
        ));
        assert!(body.contains("<media:thumbnail url=\"https://i.ytimg.com/vi/v1/maxresdefault.jpg\"/>"));
    }
}
