use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::info;

use super::{
    queue::{GuildQueue, QueueSnapshot},
    resolver::Resolver,
    scheduler::{GuildScheduler, SchedulerSettings},
    track::Track,
    transport::PlaybackSession,
};

/// What an enqueue request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub added: usize,
    /// Tracks discarded by the per-request cap
    pub dropped: usize,
    /// Whether a new scheduler task had to be spawned
    pub started: bool,
}

/// Process-wide map from guild to its playback state.
///
/// Entries are created on first reference and live for the whole process;
/// an idle guild costs one empty queue. Passed explicitly to every caller
/// instead of living in a global.
pub struct SchedulerRegistry {
    guilds: DashMap<GuildId, Arc<GuildQueue>>,
    resolver: Arc<Resolver>,
    settings: SchedulerSettings,
}

impl SchedulerRegistry {
    pub fn new(resolver: Arc<Resolver>, settings: SchedulerSettings) -> Self {
        Self {
            guilds: DashMap::new(),
            resolver,
            settings,
        }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    /// Returns the guild state, creating it on first use.
    pub fn get(&self, guild_id: GuildId) -> Arc<GuildQueue> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| Arc::new(GuildQueue::new(guild_id, self.settings.default_volume)))
            .clone()
    }

    /// Appends up to the per-request cap and starts or wakes the scheduler.
    pub fn enqueue(&self, guild_id: GuildId, tracks: Vec<Track>, session: PlaybackSession) -> EnqueueOutcome {
        let queue = self.get(guild_id);
        let requested = tracks.len();

        queue.bind_session(session);
        let added = queue.push_tracks(tracks, self.settings.max_enqueue_per_request);
        let started = self.start(guild_id);

        EnqueueOutcome {
            added,
            dropped: requested - added,
            started,
        }
    }

    /// Starts a scheduler for the guild, or only wakes the running one.
    pub fn start(&self, guild_id: GuildId) -> bool {
        let queue = self.get(guild_id);
        let started = GuildScheduler::start(&queue, &self.resolver, &self.settings);
        queue.wake().set();
        started
    }

    /// Forces the current track to end. Returns `false` if nothing was playing.
    pub async fn skip(&self, guild_id: GuildId) -> bool {
        let Some(session) = self.get(guild_id).session() else {
            return false;
        };

        if session.transport.is_playing().await {
            session.transport.stop().await;
            info!("⏭️ Canción saltada en guild {}", guild_id);
            return true;
        }
        false
    }

    /// Clears the queue and stops playback. Returns how many queued tracks were removed.
    pub async fn stop(&self, guild_id: GuildId) -> usize {
        let queue = self.get(guild_id);
        let removed = queue.clear();

        if let Some(session) = queue.session() {
            session.transport.stop().await;
        }
        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        removed
    }

    /// Stops, clears and disconnects; the scheduler idles out on its own.
    pub async fn leave(&self, guild_id: GuildId) {
        let queue = self.get(guild_id);
        queue.clear();

        if let Some(session) = queue.session() {
            session.transport.stop().await;
            session.transport.disconnect().await;
        }
        info!("👋 Guild {} abandonada", guild_id);
    }

    pub async fn pause(&self, guild_id: GuildId) -> bool {
        match self.get(guild_id).session() {
            Some(session) => session.transport.pause().await,
            None => false,
        }
    }

    pub async fn resume(&self, guild_id: GuildId) -> bool {
        match self.get(guild_id).session() {
            Some(session) => session.transport.resume().await,
            None => false,
        }
    }

    /// Sets the guild volume from a 0-100 percentage and applies it live.
    ///
    /// Returns the effective percentage.
    pub async fn set_volume(&self, guild_id: GuildId, percent: i64) -> u8 {
        let percent = percent.clamp(0, 100) as u8;
        let queue = self.get(guild_id);
        let volume = queue.set_volume(f32::from(percent) / 100.0);

        if let Some(session) = queue.session() {
            session.transport.set_volume(volume).await;
        }
        info!("🔊 Volumen en guild {} ajustado a {}%", guild_id, percent);
        percent
    }

    pub fn set_debug(&self, guild_id: GuildId, enabled: bool) {
        self.get(guild_id).set_debug(enabled);
    }

    pub fn snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        self.get(guild_id).snapshot()
    }
}
