//! CGI response writing.
//!
//! A CGI response is a block of header lines, a blank line, then the body.
//! The `Status` header carries the HTTP status; the web server adds the rest.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use std::io::{self, Write};

use crate::app::FeedError;
use crate::render::RenderedFeed;

/// IMF-fixdate, the HTTP `Last-Modified` format.
pub fn http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn status_line(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    format!("Status: {status} {reason}\r\n")
}

/// Writes a successful feed response.
pub fn write_feed<W: Write>(out: &mut W, feed: &RenderedFeed) -> io::Result<()> {
    out.write_all(status_line(200).as_bytes())?;
    write!(out, "Content-Type: {}\r\n", feed.content_type)?;
    write!(out, "Last-Modified: {}\r\n", http_date(feed.last_modified))?;
    write!(out, "Content-Length: {}\r\n\r\n", feed.body.len())?;
    out.write_all(&feed.body)?;
    out.flush()
}

/// Writes a plain-text error response with the status mapped from `err`.
pub fn write_error<W: Write>(out: &mut W, err: &FeedError) -> io::Result<()> {
    let body = format!("{err}\n");
    out.write_all(status_line(err.status()).as_bytes())?;
    out.write_all(b"Content-Type: text/plain; charset=UTF-8\r\n")?;
    write!(out, "Content-Length: {}\r\n\r\n", body.len())?;
    out.write_all(body.as_bytes())?;
    out.flush()
}
