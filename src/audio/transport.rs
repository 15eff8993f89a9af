use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use url::Url;

use super::track::Track;
use crate::error::{PlaybackError, TransportError};

/// Completion callback handed to [`Transport::play`].
///
/// Invoked exactly once when playback ends, naturally or because it was
/// stopped, with the error if it ended abnormally. It may run on a
/// transport-internal task and must not touch guild state directly.
pub type OnFinished = Box<dyn FnOnce(Option<PlaybackError>) + Send + 'static>;

/// Audio transport for one guild (a voice connection).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn is_connected(&self) -> bool;

    /// Builds a playback source for a resolved track.
    fn prepare(&self, track: &Track, volume: f32) -> Result<PlaybackSource, TransportError> {
        PlaybackSource::new(track, volume)
    }

    async fn play(&self, source: PlaybackSource, on_finished: OnFinished) -> Result<(), TransportError>;

    /// Forces the current playback to end; its completion callback fires.
    async fn stop(&self);

    async fn is_playing(&self) -> bool;

    /// Returns `false` when nothing was playing.
    async fn pause(&self) -> bool;

    /// Returns `false` when nothing was paused.
    async fn resume(&self) -> bool;

    /// Applies a volume to the current playback, if any.
    async fn set_volume(&self, volume: f32);

    /// Leaves the voice channel. Like [`stop`](Self::stop), it fires the
    /// completion callback of any current playback.
    async fn disconnect(&self);
}

/// One-way, best-effort channel to the users of a guild.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: String);
}

/// Everything the scheduler needs to reach the outside world for a guild.
#[derive(Clone)]
pub struct PlaybackSession {
    pub transport: Arc<dyn Transport>,
    pub notifier: Arc<dyn Notifier>,
}

impl PlaybackSession {
    pub fn new(transport: Arc<dyn Transport>, notifier: Arc<dyn Notifier>) -> Self {
        Self { transport, notifier }
    }
}

/// A validated stream locator ready to be played.
#[derive(Debug, Clone)]
pub struct PlaybackSource {
    pub url: Url,
    pub headers: HeaderMap,
    pub volume: f32,
}

impl PlaybackSource {
    pub fn new(track: &Track, volume: f32) -> Result<Self, TransportError> {
        let stream_url = track
            .stream_url
            .as_deref()
            .ok_or_else(|| TransportError::InvalidSource(format!("pista sin resolver: {}", track.title)))?;

        let url = Url::parse(stream_url).map_err(|e| TransportError::InvalidSource(format!("{e}: {stream_url}")))?;

        let mut headers = HeaderMap::with_capacity(track.headers.len());
        for (name, value) in &track.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidSource(format!("header {name}: {e}")))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| TransportError::InvalidSource(format!("header {name}: {e}")))?;
            headers.insert(name, value);
        }

        Ok(Self {
            url,
            headers,
            volume: volume.clamp(0.0, 1.0),
        })
    }
}
