//! Configuration file parser for `config.toml`.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
//!
//! Configuration is loaded once at startup and treated as read-only afterwards.
use chrono::TimeDelta;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::render::FeedFormat;
use crate::storage::SectionTtls;
use crate::util::TimeCodec;

/// Environment variable that overrides `api_key` from the config file.
pub const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but is not usable (unknown timezone, format, ...)
    #[error("Invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
///
/// SEC-015: Custom Debug impl masks `api_key` to prevent secret leakage
/// in logs, error messages, and debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// IANA timezone used for dates shown in feeds.
    pub timezone: String,

    /// Format served when a request names none (`rss`, `atom` or `json`).
    pub default_format: String,

    /// Serve thumbnails through the image proxy under `public_url`.
    pub enable_image_proxy: bool,

    /// Public base URL of this service, used for self links and proxied images.
    pub public_url: String,

    /// Data API key (alternative to the YOUTUBE_API_KEY env var).
    /// Env var takes precedence over config file.
    pub api_key: Option<String>,

    /// Data API base URL.
    pub api_base_url: String,

    /// Video feed endpoint.
    pub feed_base_url: String,

    /// Per-request upstream timeout.
    pub request_timeout_secs: u64,

    /// strftime pattern for dates inside item content.
    pub date_format: String,

    /// SQLite file holding cached entity state.
    pub database_path: Option<String>,

    pub cache: CacheConfig,
}

/// Section lifetimes and the staleness ceiling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub feed_ttl_minutes: u64,
    pub details_ttl_minutes: u64,
    pub videos_ttl_minutes: u64,
    /// Cached details not confirmed upstream for this long are treated as gone.
    pub staleness_ceiling_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            default_format: "rss".to_string(),
            enable_image_proxy: false,
            public_url: "http://localhost/".to_string(),
            api_key: None,
            api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            feed_base_url: "https://www.youtube.com/feeds/videos.xml".to_string(),
            request_timeout_secs: 30,
            date_format: "%B %-d, %Y %H:%M".to_string(),
            database_path: None,
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feed_ttl_minutes: 10,
            details_ttl_minutes: 1440,
            videos_ttl_minutes: 60,
            staleness_ceiling_hours: 168,
        }
    }
}

impl CacheConfig {
    /// The ceiling is measured from the last details check, so details must
    /// be rechecked before it is reached.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ceiling_minutes = self.staleness_ceiling_hours.saturating_mul(60);
        if ceiling_minutes <= self.details_ttl_minutes {
            return Err(ConfigError::Invalid {
                key: "staleness_ceiling_hours",
                reason: format!(
                    "{}h must exceed details_ttl_minutes ({})",
                    self.staleness_ceiling_hours, self.details_ttl_minutes
                ),
            });
        }
        Ok(())
    }
}

/// SEC-015: Mask api_key in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("timezone", &self.timezone)
            .field("default_format", &self.default_format)
            .field("enable_image_proxy", &self.enable_image_proxy)
            .field("public_url", &self.public_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base_url", &self.api_base_url)
            .field("feed_base_url", &self.feed_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("date_format", &self.date_format)
            .field("database_path", &self.database_path)
            .field("cache", &self.cache)
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    /// - Unusable values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        // from a maliciously large or corrupted config file.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {} // Size is within limits, proceed
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "timezone",
                "default_format",
                "enable_image_proxy",
                "public_url",
                "api_key",
                "api_base_url",
                "feed_base_url",
                "request_timeout_secs",
                "date_format",
                "database_path",
                "cache",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            timezone = %config.timezone,
            format = %config.default_format,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Checks values serde cannot: timezone, format names, date pattern, URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        TimeCodec::new(&self.timezone).map_err(|e| ConfigError::Invalid {
            key: "timezone",
            reason: e.to_string(),
        })?;
        TimeCodec::validate_pattern(&self.date_format).map_err(|e| ConfigError::Invalid {
            key: "date_format",
            reason: e.to_string(),
        })?;
        self.default_format
            .parse::<FeedFormat>()
            .map_err(|e| ConfigError::Invalid {
                key: "default_format",
                reason: e.to_string(),
            })?;
        for (key, value) in [
            ("public_url", &self.public_url),
            ("api_base_url", &self.api_base_url),
            ("feed_base_url", &self.feed_base_url),
        ] {
            url::Url::parse(value).map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            })?;
        }
        self.cache.validate()
    }

    /// API key, preferring the environment over the config file.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone())
    }

    pub fn section_ttls(&self) -> SectionTtls {
        SectionTtls {
            feed: minutes(self.cache.feed_ttl_minutes),
            details: minutes(self.cache.details_ttl_minutes),
            videos: minutes(self.cache.videos_ttl_minutes),
        }
    }

    pub fn staleness_ceiling(&self) -> TimeDelta {
        TimeDelta::try_hours(self.cache.staleness_ceiling_hours.min(i64::MAX as u64) as i64)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn minutes(value: u64) -> TimeDelta {
    TimeDelta::try_minutes(value.min(i64::MAX as u64) as i64).unwrap_or(TimeDelta::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.default_format, "rss");
        assert!(!config.enable_image_proxy);
        assert!(config.api_key.is_none());
        assert_eq!(config.cache.feed_ttl_minutes, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/ytfeed_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.timezone, "UTC");
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = std::env::temp_dir().join("ytfeed_config_test_empty");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.default_format, "rss");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let dir = std::env::temp_dir().join("ytfeed_config_test_full");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let content = r#"
timezone = "Europe/London"
default_format = "atom"
enable_image_proxy = true
public_url = "https://feeds.example.com/"
api_key = "test-key-123"
request_timeout_secs = 5
date_format = "%Y-%m-%d"

[cache]
feed_ttl_minutes = 5
details_ttl_minutes = 120
videos_ttl_minutes = 30
staleness_ceiling_hours = 48
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.timezone, "Europe/London");
        assert_eq!(config.default_format, "atom");
        assert!(config.enable_image_proxy);
        assert_eq!(config.api_key.as_deref(), Some("test-key-123"));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));

        let ttls = config.section_ttls();
        assert_eq!(ttls.feed, TimeDelta::minutes(5));
        assert_eq!(ttls.details, TimeDelta::minutes(120));
        assert_eq!(ttls.videos, TimeDelta::minutes(30));
        assert_eq!(config.staleness_ceiling(), TimeDelta::hours(48));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_cache_table_uses_defaults() {
        let dir = std::env::temp_dir().join("ytfeed_config_test_partial_cache");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[cache]\nvideos_ttl_minutes = 15\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.cache.videos_ttl_minutes, 15);
        assert_eq!(config.cache.feed_ttl_minutes, 10);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = std::env::temp_dir().join("ytfeed_config_test_invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let dir = std::env::temp_dir().join("ytfeed_config_test_bad_tz");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "timezone = \"Nowhere/Special\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "timezone", .. }));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_staleness_ceiling_must_exceed_details_ttl() {
        let config = Config {
            cache: CacheConfig {
                details_ttl_minutes: 14 * 24 * 60,
                ..CacheConfig::default()
            },
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "staleness_ceiling_hours",
                ..
            })
        ));

        let config = Config {
            cache: CacheConfig {
                details_ttl_minutes: 14 * 24 * 60,
                staleness_ceiling_hours: 30 * 24,
                ..CacheConfig::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_default_format_rejected() {
        let config = Config {
            default_format: "yaml".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "default_format",
                ..
            })
        ));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = std::env::temp_dir().join("ytfeed_config_test_unknown");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "timezone = \"UTC\"\ntotally_fake_key = 1\n").unwrap();

        assert!(Config::load(&path).is_ok());

        std::fs::remove_dir_all(&dir).ok();
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let dir = std::env::temp_dir().join("ytfeed_config_test_too_large");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    // SEC-015: Debug output masks API key
    #[test]
    fn test_debug_masks_api_key() {
        let config = Config {
            api_key: Some("super-secret-key-12345".to_string()),
            ..Config::default()
        };

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-key-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
