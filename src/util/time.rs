//! Conversion of platform-native time encodings.
//!
//! The Data API reports video lengths as ISO 8601 durations (`PT4M13S`) and
//! timestamps as RFC 3339 in UTC. Feeds want a short `MM:SS` duration and
//! dates rendered in the operator's timezone, which is what this module does.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Weeks and days are accepted; years and months have no fixed length and are not.
static ISO8601_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").unwrap()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeError {
    #[error("Invalid ISO 8601 duration: {0:?}")]
    InvalidDuration(String),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid date format pattern: {0:?}")]
    InvalidPattern(String),
}

/// Canonical video length, stored as whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoDuration(u64);

impl VideoDuration {
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

/// `MM:SS` below one hour, `HH:MM:SS` otherwise. Days fold into hours.
impl fmt::Display for VideoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;

        if hours > 0 {
            write!(f, "{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            write!(f, "{:02}:{:02}", minutes, seconds)
        }
    }
}

/// Parses an ISO 8601 duration such as `PT1H2M3S` or `P1DT30M`.
///
/// # Errors
///
/// Returns [`TimeError::InvalidDuration`] for empty designators (`P`, `PT`),
/// a dangling `T`, negative durations, year/month components, fractional
/// values and totals that overflow `u64` seconds.
pub fn parse_duration(iso8601: &str) -> Result<VideoDuration, TimeError> {
    let invalid = || TimeError::InvalidDuration(iso8601.to_string());
    let trimmed = iso8601.trim();

    if trimmed.ends_with('T') {
        return Err(invalid());
    }

    let caps = ISO8601_DURATION.captures(trimmed).ok_or_else(invalid)?;

    const UNITS: [u64; 5] = [7 * 86_400, 86_400, 3_600, 60, 1];
    let mut total: u64 = 0;
    let mut any_component = false;

    for (index, unit) in UNITS.iter().enumerate() {
        if let Some(m) = caps.get(index + 1) {
            any_component = true;
            let value: u64 = m.as_str().parse().map_err(|_| invalid())?;
            total = value
                .checked_mul(*unit)
                .and_then(|secs| total.checked_add(secs))
                .ok_or_else(invalid)?;
        }
    }

    if !any_component {
        return Err(invalid());
    }

    Ok(VideoDuration(total))
}

/// Timezone-aware timestamp formatting.
///
/// Holds only the configured timezone; cheap to copy into each renderer.
#[derive(Debug, Clone, Copy)]
pub struct TimeCodec {
    tz: Tz,
}

impl TimeCodec {
    /// Creates a codec for an IANA timezone name (`"Europe/London"`, `"UTC"`).
    pub fn new(timezone: &str) -> Result<Self, TimeError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| TimeError::InvalidTimezone(timezone.to_string()))?;
        Ok(Self { tz })
    }

    /// Formats `timestamp` with a strftime `pattern` in the configured timezone.
    ///
    /// Patterns come from configuration and are checked with
    /// [`TimeCodec::validate_pattern`] at load time; formatting an invalid
    /// pattern here would panic inside chrono.
    pub fn format(&self, timestamp: DateTime<Utc>, pattern: &str) -> String {
        timestamp.with_timezone(&self.tz).format(pattern).to_string()
    }

    /// RFC 2822 date, as used by RSS `pubDate`.
    pub fn rfc2822(&self, timestamp: DateTime<Utc>) -> String {
        timestamp.with_timezone(&self.tz).to_rfc2822()
    }

    /// RFC 3339 date, as used by Atom and JSON Feed.
    pub fn rfc3339(&self, timestamp: DateTime<Utc>) -> String {
        timestamp.with_timezone(&self.tz).to_rfc3339()
    }

    /// Rejects strftime patterns chrono cannot render.
    pub fn validate_pattern(pattern: &str) -> Result<(), TimeError> {
        if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
            return Err(TimeError::InvalidPattern(pattern.to_string()));
        }
        Ok(())
    }
}

impl Default for TimeCodec {
    fn default() -> Self {
        Self { tz: Tz::UTC }
    }
}
