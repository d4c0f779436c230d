//! Time handling shared by the fetch and render paths.
//!
//! - **Durations**: ISO 8601 video durations into [`VideoDuration`]
//! - **Timestamps**: [`TimeCodec`] formats instants in the configured timezone

mod time;

pub use time::{parse_duration, TimeCodec, TimeError, VideoDuration};
