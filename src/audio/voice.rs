use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::HttpRequest,
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::transport::{OnFinished, PlaybackSource, Transport};
use crate::error::{PlaybackError, TransportError};

/// [`Transport`] over a songbird voice call.
///
/// One instance per guild; it remembers the track it started last so
/// skip/stop/pause can reach it.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    http: reqwest::Client,
    current: Mutex<Option<CurrentTrack>>,
}

#[derive(Clone)]
struct CurrentTrack {
    handle: TrackHandle,
    completion: Completion,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId, http: reqwest::Client) -> Self {
        Self {
            manager,
            guild_id,
            http,
            current: Mutex::new(None),
        }
    }

    fn handle(&self) -> Option<TrackHandle> {
        self.current.lock().as_ref().map(|current| current.handle.clone())
    }

    /// Stops the current track and fires its completion right away.
    ///
    /// Songbird's End event may never arrive once the driver is torn down.
    fn end_current(&self, forget: bool) {
        let current = {
            let mut slot = self.current.lock();
            if forget {
                slot.take()
            } else {
                slot.clone()
            }
        };

        if let Some(current) = current {
            let _ = current.handle.stop();
            current.completion.fire(None);
        }
    }
}

#[async_trait]
impl Transport for SongbirdTransport {
    async fn is_connected(&self) -> bool {
        match self.manager.get(self.guild_id) {
            Some(call) => call.lock().await.current_channel().is_some(),
            None => false,
        }
    }

    async fn play(&self, source: PlaybackSource, on_finished: OnFinished) -> Result<(), TransportError> {
        let call = self.manager.get(self.guild_id).ok_or(TransportError::Unavailable)?;

        let input = HttpRequest::new_with_headers(self.http.clone(), source.url.to_string(), source.headers);
        let handle = {
            let mut call = call.lock().await;
            call.play_input(input.into())
        };

        let _ = handle.set_volume(source.volume);

        let completion = Completion::new(on_finished);
        let handler = CompletionHandler {
            guild_id: self.guild_id,
            completion: completion.clone(),
        };

        let registered = handle
            .add_event(Event::Track(TrackEvent::End), handler.clone())
            .and_then(|()| handle.add_event(Event::Track(TrackEvent::Error), handler));

        if let Err(e) = registered {
            // Sin handler nadie despertaría al scheduler
            let _ = handle.stop();
            return Err(TransportError::Play(e.to_string()));
        }

        *self.current.lock() = Some(CurrentTrack { handle, completion });
        Ok(())
    }

    async fn stop(&self) {
        self.end_current(false);
    }

    /// Playing or paused: a track the scheduler is still waiting on.
    async fn is_playing(&self) -> bool {
        let Some(handle) = self.handle() else {
            return false;
        };

        match handle.get_info().await {
            Ok(state) => matches!(state.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }

    async fn pause(&self) -> bool {
        self.handle().is_some_and(|handle| handle.pause().is_ok())
    }

    async fn resume(&self) -> bool {
        self.handle().is_some_and(|handle| handle.play().is_ok())
    }

    async fn set_volume(&self, volume: f32) {
        if let Some(handle) = self.handle() {
            let _ = handle.set_volume(volume);
        }
    }

    async fn disconnect(&self) {
        self.end_current(true);

        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("⚠️ Error al desconectar de voz en guild {}: {:?}", self.guild_id, e);
        }
    }
}

/// One-shot completion shared by the track events and `stop`/`disconnect`.
#[derive(Clone)]
struct Completion(Arc<Mutex<Option<OnFinished>>>);

impl Completion {
    fn new(on_finished: OnFinished) -> Self {
        Self(Arc::new(Mutex::new(Some(on_finished))))
    }

    /// Runs the callback unless it already ran. Returns whether it ran now.
    fn fire(&self, outcome: Option<PlaybackError>) -> bool {
        let callback = self.0.lock().take();
        match callback {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => false,
        }
    }
}

#[derive(Clone)]
struct CompletionHandler {
    guild_id: GuildId,
    completion: Completion,
}

#[async_trait]
impl VoiceEventHandler for CompletionHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(PlaybackError(format!("{e:?}"))),
                _ => None,
            }),
            _ => None,
        };

        if self.completion.fire(error) {
            debug!("🏁 Pista terminada en guild {}", self.guild_id);
        }

        Some(Event::Cancel)
    }
}
