use std::collections::HashMap;

use crate::sources::StreamInfo;

/// A queue entry.
///
/// A track without `stream_url` is *lazy*: it only carries enough
/// information (`source_url`) to be resolved once it reaches the head of
/// the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub title: String,
    /// Page URL (or query) usable to resolve the track again
    pub source_url: String,
    pub requester: String,
    /// Direct audio URL; `None` until resolved
    pub stream_url: Option<String>,
    /// Headers the transport must send when fetching `stream_url`
    pub headers: HashMap<String, String>,
}

impl Track {
    /// Builds a fully resolved track from extractor output.
    pub fn resolved(info: StreamInfo, requester: impl Into<String>) -> Self {
        Self {
            title: info.title,
            source_url: info.page_url,
            requester: requester.into(),
            stream_url: Some(info.stream_url),
            headers: info.headers,
        }
    }

    /// Builds a deferred track that will be resolved right before playing.
    pub fn lazy(
        title: impl Into<String>,
        source_url: impl Into<String>,
        requester: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            source_url: source_url.into(),
            requester: requester.into(),
            stream_url: None,
            headers: HashMap::new(),
        }
    }

    pub fn is_lazy(&self) -> bool {
        self.stream_url.is_none()
    }

    /// Fills this track in place with a late resolution result.
    ///
    /// The title is only replaced when the resolver produced a non-empty one.
    pub fn absorb(&mut self, resolved: Track) {
        self.stream_url = resolved.stream_url;
        self.headers = resolved.headers;
        if !resolved.title.trim().is_empty() {
            self.title = resolved.title;
        }
    }
}
