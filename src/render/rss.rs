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

const CONTENT_TYPE: &str = "text/xml; charset=UTF-8";

/// RSS 2.0 with `content:encoded` item bodies.
pub struct RssRenderer {
    context: Arc<RenderContext>,
}

impl RssRenderer {
    pub fn new(context: Arc<RenderContext>) -> Self {
        Self { context }
    }
}

impl FormatRenderer for RssRenderer {
    fn format(&self) -> FeedFormat {
        FeedFormat::Rss
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

        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        rss.push_attribute(("xmlns:atom", "http://www.w3.org/2005/Atom"));
        rss.push_attribute(("xmlns:content", "http://purl.org/rss/1.0/modules/content/"));
        rss.push_attribute(("xmlns:dc", "http://purl.org/dc/elements/1.1/"));
        doc.start(rss)?;
        doc.open("channel")?;

        doc.text("title", &details.title)?;
        doc.text("link", &details.url)?;

        let self_url = ctx
            .links
            .self_url(entity, FeedFormat::Rss, options.embed_videos);
        let mut self_link = BytesStart::new("atom:link");
        self_link.push_attribute(("href", self_url.as_str()));
        self_link.push_attribute(("rel", "self"));
        self_link.push_attribute(("type", "application/rss+xml"));
        doc.empty(self_link)?;

        doc.text("description", &details.description)?;
        doc.text("pubDate", &ctx.time.rfc2822(model.updated_at))?;

        if let Some(image) = &details.thumbnail_url {
            doc.open("image")?;
            doc.text("url", image)?;
            doc.text("title", &details.title)?;
            doc.text("link", &details.url)?;
            doc.close("image")?;
        }

        for video in &model.videos {
            let thumbnail = ctx.links.thumbnail(video, entity);

            doc.open("item")?;
            doc.text("title", item_title(video))?;
            doc.text("pubDate", &ctx.time.rfc2822(video.published_at))?;
            doc.text("link", &video.url)?;

            let mut guid = BytesStart::new("guid");
            guid.push_attribute(("isPermaLink", "true"));
            doc.text_with(guid, &video.url)?;

            doc.text("dc:creator", item_author(video, model))?;
            doc.text(
                "content:encoded",
                &item_html(
                    video,
                    thumbnail.as_deref(),
                    options,
                    &ctx.time,
                    &ctx.date_format,
                ),
            )?;

            if let Some(thumbnail) = &thumbnail {
                let mut enclosure = BytesStart::new("enclosure");
                enclosure.push_attribute(("url", thumbnail.as_str()));
                enclosure.push_attribute(("length", "0"));
                enclosure.push_attribute(("type", "image/jpeg"));
                doc.empty(enclosure)?;
            }

            for tag in &video.tags {
                doc.text("category", tag)?;
            }
            doc.close("item")?;
        }

        doc.close("channel")?;
        doc.close("rss")?;

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

    fn render(image_proxy: bool, options: RenderOptions) -> String {
        let renderer = RssRenderer::new(Arc::new(context(image_proxy)));
        let rendered = renderer.render(&model(), options).unwrap();
        assert_eq!(rendered.content_type, "text/xml; charset=UTF-8");
        String::from_utf8(rendered.body).unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_items_and_order() {
        let body = render(false, RenderOptions::default());
        let parsed = feed_rs::parser::parse(body.as_bytes()).unwrap();

        assert_eq!(parsed.title.unwrap().content, "Channel X & Friends");
        let links: Vec<_> = parsed
            .entries
            .iter()
            .map(|e| e.links[0].href.clone())
            .collect();
        assert_eq!(
            links,
            vec![
                "https://www.youtube.com/watch?v=v1",
                "https://www.youtube.com/watch?v=v2",
                "https://www.youtube.com/watch?v=v3",
            ]
        );
        assert_eq!(parsed.entries[0].title.as_ref().unwrap().content, "First & best");
        assert_eq!(parsed.entries[2].title.as_ref().unwrap().content, "Untitled");
    }

    #[test]
    fn test_text_escaped_exactly_once() {
        let body = render(false, RenderOptions::default());
        assert!(body.contains("<title>Channel X &amp; Friends</title>"));
        assert!(body.contains("<description>About &lt;us&gt;</description>"));
        assert!(!body.contains("&amp;amp;amp;"));

        let parsed = feed_rs::parser::parse(body.as_bytes()).unwrap();
        let html = parsed.entries[1]
            .content
            .as_ref()
            .and_then(|c| c.body.clone())
            .unwrap();
        assert!(html.contains("Second line &lt;b&gt;"));
        assert!(html.contains("<a href=\"https://example.com/a?b=1&amp;c=2\">"));
    }

    #[test]
    fn test_channel_metadata() {
        let body = render(false, RenderOptions::default());
        assert!(body.contains(
            "<atom:link href=\"https://feeds.example.com/?channel_id=UCabcdefghijklmnopqrstuv&amp;format=rss\" rel=\"self\" type=\"application/rss+xml\"/>"
        ));
        assert!(body.contains("<pubDate>Fri, 3 May 2024 09:35:00 +0000</pubDate>"));
        assert!(body.contains("<url>https://yt3.ggpht.com/avatar.jpg</url>"));
        assert!(body.contains("<guid isPermaLink=\"true\">https://www.youtube.com/watch?v=v1</guid>"));
        assert!(body.contains("<category>rust</category>"));
    }

    #[test]
    fn test_enclosure_uses_proxy_when_enabled() {
        let direct = render(false, RenderOptions::default());
        assert!(direct.contains(
            "<enclosure url=\"https://i.ytimg.com/vi/v1/maxresdefault.jpg\" length=\"0\" type=\"image/jpeg\"/>"
        ));

        let proxied = render(true, RenderOptions::default());
        assert!(proxied.contains(
            "<enclosure url=\"https://feeds.example.com/thumbnail?video_id=v1&amp;entity_kind=channel&amp;entity_id=UCabcdefghijklmnopqrstuv\""
        ));
    }

    #[test]
    fn test_embed_option_switches_content() {
        let body = render(false, RenderOptions { embed_videos: true });
        assert!(body.contains("youtube-nocookie.com/embed/v1"));
        assert!(body.contains("embed_videos=true"));
    }

    #[test]
    fn test_empty_video_list_renders_channel_only() {
        let renderer = RssRenderer::new(Arc::new(context(false)));
        let mut model = model();
        model.videos.clear();
        let body = String::from_utf8(
            renderer
                .render(&model, RenderOptions::default())
                .unwrap()
                .body,
        )
        .unwrap();
        assert!(!body.contains("<item>"));
        assert!(body.contains("<channel>"));
    }
}
