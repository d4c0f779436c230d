//! Caching feed generator for YouTube channels and playlists.
//!
//! A request names one channel or playlist. [`app::App`] refreshes the
//! entity's cached sections conditionally ([`feed::Orchestrator`]), projects
//! them into a canonical model ([`feed::assemble`]) and renders RSS, Atom or
//! JSON Feed ([`render`]).

pub mod app;
pub mod config;
pub mod feed;
pub mod output;
pub mod render;
pub mod request;
pub mod storage;
pub mod util;
