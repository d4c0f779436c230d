//! Fetching and merging of channel and playlist state.
//!
//! - [`parser`] - Decodes the Atom video feed (`feed-rs`) and Data API JSON
//! - [`fetcher`] - The [`Upstream`] contract and its HTTP implementation
//! - [`orchestrator`] - One conditional refresh pass per request
//! - [`assembler`] - Projection of cached state into a render-ready model
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = Orchestrator::new(db, ApiClient::new(client, settings), ttls);
//! let report = orchestrator.refresh("UC...", EntityKind::Channel, Utc::now()).await?;
//! let model = assemble(&report.entity)?;
//! ```

pub mod assembler;
pub mod fetcher;
pub mod orchestrator;
pub mod parser;

pub use assembler::{assemble, AssembleError, CanonicalFeedModel};
pub use fetcher::{ApiClient, ApiSettings, FetchError, Upstream, MAX_VIDEO_IDS_PER_REQUEST};
pub use orchestrator::{Orchestrator, RefreshError, RefreshReport, SectionOutcome};
pub use parser::ParseError;
