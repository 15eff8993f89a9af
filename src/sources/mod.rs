//! # Sources Module
//!
//! The extraction collaborator used by the [`Resolver`](crate::audio::resolver::Resolver).
//!
//! An [`Extractor`] answers two questions:
//!
//! - **Flat listing**: is this query a single item or a playlist? Playlist
//!   entries come back shallow (id/url/title only, no stream URL) so the
//!   listing is instant.
//! - **Stream resolution**: given a concrete URL (or a search query), what is
//!   the direct audio URL and which HTTP headers must be sent to fetch it?
//!
//! The production implementation is [`YtDlpExtractor`], which drives the
//! `yt-dlp` binary.

pub mod ytdlp;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::ResolutionError;

pub use ytdlp::YtDlpExtractor;

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Extraction backend consumed by the resolver.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Classifies a query without resolving streams.
    async fn extract_flat(&self, query: &str) -> Result<FlatListing, ResolutionError>;

    /// Fully resolves a URL or search query to a playable stream.
    async fn extract_stream(&self, query: &str) -> Result<StreamInfo, ResolutionError>;
}

/// Result of a flat (shallow) extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatListing {
    Single,
    Playlist(Vec<FlatEntry>),
}

/// A shallow playlist entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatEntry {
    pub id: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
}

impl FlatEntry {
    /// Canonical page URL for the entry.
    ///
    /// Falls back to a YouTube watch URL built from the id when the listing
    /// only reports ids. `None` means the entry is unusable.
    pub fn canonical_url(&self) -> Option<String> {
        let non_blank = |s: &Option<String>| s.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned);

        non_blank(&self.url).or_else(|| non_blank(&self.id).map(|id| format!("{WATCH_URL_PREFIX}{id}")))
    }
}

/// A fully resolved stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub stream_url: String,
    pub title: String,
    pub page_url: String,
    pub headers: HashMap<String, String>,
}
