use std::sync::Arc;
use tracing::{debug, info};

use super::track::Track;
use crate::{
    error::ResolutionError,
    sources::{Extractor, FlatListing},
};

const UNKNOWN_TITLE: &str = "Título desconocido";

/// Turns user queries into queue tracks.
///
/// Playlists are resolved lazily: only the first entry pays the extraction
/// cost up front, the rest are queued with just their page URL and resolved
/// by the scheduler when they reach the head of the queue.
pub struct Resolver {
    extractor: Arc<dyn Extractor>,
}

impl Resolver {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self { extractor }
    }

    /// Resolves a single URL or search query to a playable track.
    pub async fn resolve_single(&self, query: &str, requester: &str) -> Result<Track, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::EmptyQuery);
        }

        let info = self.extractor.extract_stream(query).await?;
        debug!("🔗 Resuelto: {} -> {}", query, info.title);
        Ok(Track::resolved(info, requester))
    }

    /// Resolves a query into `[first (resolved), rest (lazy)...]`.
    ///
    /// A non-playlist query yields exactly one resolved track. A flat listing
    /// without usable entries falls back to single resolution.
    pub async fn resolve_lazy(&self, query: &str, requester: &str) -> Result<Vec<Track>, ResolutionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ResolutionError::EmptyQuery);
        }

        let entries = match self.extractor.extract_flat(query).await? {
            FlatListing::Single => return Ok(vec![self.resolve_single(query, requester).await?]),
            FlatListing::Playlist(entries) => entries,
        };

        let mut usable = entries
            .into_iter()
            .filter_map(|entry| entry.canonical_url().map(|url| (url, entry.title)));

        let Some((first_url, _)) = usable.next() else {
            debug!("📭 Listado sin entradas utilizables, resolviendo como única: {}", query);
            return Ok(vec![self.resolve_single(query, requester).await?]);
        };

        let mut tracks = vec![self.resolve_single(&first_url, requester).await?];
        tracks.extend(usable.map(|(url, title)| {
            Track::lazy(title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()), url, requester)
        }));

        info!("📋 Playlist: 1 resuelta, {} diferidas", tracks.len() - 1);
        Ok(tracks)
    }
}
