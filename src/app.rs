use chrono::{DateTime, TimeDelta, Utc};
use reqwest::redirect::Policy;
use secrecy::SecretString;
use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::feed::{
    assemble, ApiClient, ApiSettings, AssembleError, FetchError, Orchestrator, RefreshError,
    Upstream,
};
use crate::render::{
    FeedFormat, LinkBuilder, RenderContext, RenderError, RenderOptions, RenderedFeed, Renderers,
    UnsupportedFormat,
};
use crate::request::{RequestError, RequestParameters};
use crate::storage::{Database, Entity, EntityKind, SectionName, StoreError};
use crate::util::TimeCodec;

// ============================================================================
// Error Types
// ============================================================================

/// Why a feed request produced no document.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid request: {0}")]
    InvalidParameter(#[from] RequestError),

    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormat),

    /// Upstream reports the entity missing, or it has not been confirmed
    /// within the staleness ceiling
    #[error("{kind} {id} is no longer available")]
    EntityGone { id: String, kind: EntityKind },

    #[error("Upstream {section} unavailable: {reason}")]
    UpstreamFailed { section: SectionName, reason: String },

    #[error("Not enough data to build a feed: {0}")]
    IncompleteData(#[from] AssembleError),

    #[error("Failed to render feed: {0}")]
    Render(#[from] RenderError),

    #[error("Cache unavailable: {0}")]
    Store(#[from] StoreError),
}

impl FeedError {
    /// HTTP status reported to CGI clients.
    pub fn status(&self) -> u16 {
        match self {
            FeedError::InvalidParameter(_) | FeedError::UnsupportedFormat(_) => 400,
            FeedError::EntityGone { .. } => 404,
            FeedError::UpstreamFailed { .. } | FeedError::IncompleteData(_) => 502,
            FeedError::Render(_) | FeedError::Store(_) => 500,
        }
    }
}

impl From<RefreshError> for FeedError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Store(e) => FeedError::Store(e),
            RefreshError::EntityGone { id, kind } => FeedError::EntityGone { id, kind },
            RefreshError::UpstreamFailed { section, reason } => {
                FeedError::UpstreamFailed { section, reason }
            }
        }
    }
}

// ============================================================================
// HTTP Client Configuration
// ============================================================================

/// Create a custom redirect policy with loop detection and limited hops.
///
/// - Limits redirects to 3 hops maximum
/// - Detects redirect loops (same URL appearing twice in chain)
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        // Only the host: API URLs carry the key in their query
        tracing::debug!(
            to = %url.host_str().unwrap_or("unknown"),
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Builds the production [`Upstream`] from configuration.
pub fn build_api_client(config: &Config) -> Result<ApiClient, FetchError> {
    let timeout = config.request_timeout();
    let client = reqwest::Client::builder()
        .redirect(create_redirect_policy())
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .timeout(timeout)
        .user_agent(concat!("ytfeed/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let api_key = config.resolve_api_key().map(SecretString::from);
    if api_key.is_none() {
        tracing::warn!("No API key configured; details and videos cannot be fetched");
    }

    Ok(ApiClient::new(
        client,
        ApiSettings {
            api_base_url: config.api_base_url.clone(),
            feed_base_url: config.feed_base_url.clone(),
            api_key,
            timeout,
            ..ApiSettings::default()
        },
    ))
}

// ============================================================================
// Application
// ============================================================================

fn invalid(key: &'static str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

/// Request pipeline: refresh, assemble, render.
///
/// Built once per process from an immutable [`Config`].
pub struct App<U> {
    orchestrator: Orchestrator<U>,
    renderers: Renderers,
    default_format: FeedFormat,
    staleness_ceiling: TimeDelta,
}

impl<U: Upstream> App<U> {
    pub fn new(config: &Config, db: Database, upstream: U) -> Result<Self, ConfigError> {
        config.cache.validate()?;
        let time = TimeCodec::new(&config.timezone).map_err(|e| invalid("timezone", e))?;
        TimeCodec::validate_pattern(&config.date_format)
            .map_err(|e| invalid("date_format", e))?;
        let default_format = config
            .default_format
            .parse::<FeedFormat>()
            .map_err(|e| invalid("default_format", e))?;
        let links = LinkBuilder::new(&config.public_url, config.enable_image_proxy)
            .map_err(|e| invalid("public_url", e))?;

        let renderers = Renderers::new(RenderContext {
            time,
            date_format: config.date_format.clone(),
            links,
        });

        Ok(Self {
            orchestrator: Orchestrator::new(db, upstream, config.section_ttls()),
            renderers,
            default_format,
            staleness_ceiling: config.staleness_ceiling(),
        })
    }

    /// Produces the feed document for one request.
    ///
    /// # Errors
    ///
    /// See [`FeedError`]; [`FeedError::status`] maps each to an HTTP status.
    pub async fn generate(
        &self,
        params: &RequestParameters,
        now: DateTime<Utc>,
    ) -> Result<RenderedFeed, FeedError> {
        let format = params.format.unwrap_or(self.default_format);

        let report = self
            .orchestrator
            .refresh(&params.entity_id, params.kind, now)
            .await?;
        self.check_staleness(&report.entity, now)?;

        let model = assemble(&report.entity)?;
        let rendered = self.renderers.get(format).render(
            &model,
            RenderOptions {
                embed_videos: params.embed_videos,
            },
        )?;

        tracing::info!(
            entity = %params.entity_id,
            kind = %params.kind,
            format = %format,
            items = model.videos.len(),
            updated = report.updated_sections(),
            "Feed generated"
        );
        Ok(rendered)
    }

    /// Drops cached entities not saved since `cutoff`.
    pub async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.orchestrator.database().evict_older_than(cutoff).await
    }

    /// Cached details the platform has not confirmed for too long are not served.
    fn check_staleness(&self, entity: &Entity, now: DateTime<Utc>) -> Result<(), FeedError> {
        if entity.details.payload.is_none() {
            return Ok(());
        }
        match entity.details.last_checked_at {
            Some(checked) if now - checked > self.staleness_ceiling => {
                tracing::warn!(
                    entity = %entity.id,
                    last_checked = %checked,
                    "Cached details exceed staleness ceiling"
                );
                Err(FeedError::EntityGone {
                    id: entity.id.clone(),
                    kind: entity.kind,
                })
            }
            _ => Ok(()),
        }
    }
}
