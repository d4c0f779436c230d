//! HTML body of a feed item.
//!
//! The returned markup is plain, unescaped-for-XML text: every interpolated
//! field is HTML-escaped here, and the document writer escapes the whole
//! body once more when embedding it.

use quick_xml::escape::escape;
use regex::{Captures, Regex};
use std::fmt::Write;
use std::sync::LazyLock;

use super::RenderOptions;
use crate::storage::VideoItem;
use crate::util::TimeCodec;

const EMBED_BASE: &str = "https://www.youtube-nocookie.com/embed/";

/// URL candidates inside already-escaped text; see [`url_len`] for the end.
static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"']+"#).unwrap());

/// Escaped markup that ends a URL. `&amp;` stays part of it.
const ESCAPED_DELIMITERS: [&str; 4] = ["&lt;", "&gt;", "&quot;", "&apos;"];

/// Item HTML: player or linked thumbnail, publish date and duration, then the
/// description with links and line breaks.
pub fn item_html(
    video: &VideoItem,
    thumbnail: Option<&str>,
    options: RenderOptions,
    time: &TimeCodec,
    date_format: &str,
) -> String {
    let mut html = String::new();

    if options.embed_videos {
        let _ = write!(
            html,
            r#"<iframe width="560" height="315" src="{EMBED_BASE}{}" frameborder="0" allowfullscreen></iframe>"#,
            escape(&video.id)
        );
    } else if let Some(thumbnail) = thumbnail {
        let _ = write!(
            html,
            r#"<a href="{}"><img src="{}" alt="{}"/></a>"#,
            escape(&video.url),
            escape(thumbnail),
            escape(&video.title)
        );
    }

    let _ = write!(
        html,
        "<hr/>Published: {}",
        escape(&time.format(video.published_at, date_format))
    );
    if let Some(duration) = video.duration {
        let _ = write!(html, " - Duration: {duration}");
    }
    html.push_str("<hr/>");

    if !video.description.trim().is_empty() {
        let _ = write!(html, "<p>{}</p>", format_description(&video.description));
    }

    html
}

/// Escapes a plain-text description, links its URLs and keeps its line breaks.
pub fn format_description(text: &str) -> String {
    let escaped = escape(text.trim());
    let linked = URL_PATTERN.replace_all(&escaped, |caps: &Captures<'_>| {
        let candidate = &caps[0];
        let (url, rest) = candidate.split_at(url_len(candidate));
        if url.ends_with("://") {
            return candidate.to_string();
        }
        format!(r#"<a href="{url}">{url}</a>{rest}"#)
    });
    linked.replace("\r\n", "\n").replace('\n', "<br>")
}

/// Length of the URL at the start of an escaped candidate match.
///
/// Stops before escaped markup and drops trailing sentence punctuation. A
/// closing parenthesis is kept only when it balances one inside the URL.
fn url_len(candidate: &str) -> usize {
    let mut end = ESCAPED_DELIMITERS
        .iter()
        .filter_map(|delimiter| candidate.find(delimiter))
        .min()
        .unwrap_or(candidate.len());

    while let Some(last) = candidate[..end].chars().next_back() {
        let url = &candidate[..end];
        let trim = match last {
            '.' | ',' | ':' | '!' | '?' => true,
            ')' => url.matches('(').count() < url.matches(')').count(),
            _ => false,
        };
        if !trim {
            break;
        }
        end -= last.len_utf8();
    }
    end
}
