use parking_lot::Mutex;
use serenity::model::id::GuildId;
use std::{collections::VecDeque, sync::Arc};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};

use super::{track::Track, transport::PlaybackSession};

/// Where a guild's scheduler currently is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    WaitingForItem,
    Resolving,
    AwaitingTransport,
    Playing,
    Terminating,
}

/// Level-triggered notification used to wake a blocked scheduler.
///
/// Stays set until explicitly cleared, so a `set` that happens before the
/// scheduler starts waiting is never lost.
#[derive(Debug, Clone)]
pub struct WakeSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl WakeSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves as soon as the signal is set (immediately if it already is).
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // El sender vive en `self`, el canal no puede cerrarse aquí
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

enum SchedulerSlot {
    NotRunning,
    Running { id: u64, task: JoinHandle<()> },
}

struct QueueInner {
    tracks: VecDeque<Track>,
    now_playing: Option<Track>,
    volume: f32,
    debug: bool,
    /// Bumped on every clear so in-flight work can notice it was cancelled
    epoch: u64,
    phase: SchedulerPhase,
    scheduler: SchedulerSlot,
    scheduler_seq: u64,
    session: Option<PlaybackSession>,
}

/// Per-guild playback state.
///
/// Owned by the [`SchedulerRegistry`](super::registry::SchedulerRegistry);
/// the running scheduler only drives it. All mutable fields sit behind one
/// mutex so an enqueue and the scheduler's pop never interleave.
pub struct GuildQueue {
    guild_id: GuildId,
    inner: Mutex<QueueInner>,
    wake: WakeSignal,
}

/// Read-only view used by `np` / `queue`.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub now_playing: Option<Track>,
    pub tracks: Vec<Track>,
    pub volume: f32,
    pub debug: bool,
    pub phase: SchedulerPhase,
}

impl GuildQueue {
    pub fn new(guild_id: GuildId, volume: f32) -> Self {
        Self {
            guild_id,
            inner: Mutex::new(QueueInner {
                tracks: VecDeque::new(),
                now_playing: None,
                volume: volume.clamp(0.0, 1.0),
                debug: false,
                epoch: 0,
                phase: SchedulerPhase::Idle,
                scheduler: SchedulerSlot::NotRunning,
                scheduler_seq: 0,
                session: None,
            }),
            wake: WakeSignal::new(),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn wake(&self) -> &WakeSignal {
        &self.wake
    }

    /// Appends tracks in order, keeping at most `cap` of them.
    ///
    /// Returns how many were appended.
    pub fn push_tracks(&self, tracks: Vec<Track>, cap: usize) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.tracks.len();
        inner.tracks.extend(tracks.into_iter().take(cap));
        let added = inner.tracks.len() - before;
        info!("➕ {} canciones agregadas a la cola de guild {}", added, self.guild_id);
        added
    }

    /// Pops the head together with the epoch it was popped in.
    pub fn pop_front(&self) -> Option<(Track, u64)> {
        let mut inner = self.inner.lock();
        let epoch = inner.epoch;
        inner.tracks.pop_front().map(|track| (track, epoch))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tracks.len()
    }

    /// Empties the queue and the now-playing slot. Returns removed count.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.tracks.len();
        inner.tracks.clear();
        inner.now_playing = None;
        inner.epoch += 1;
        info!("🗑️ Cola limpiada en guild {} ({} canciones)", self.guild_id, removed);
        removed
    }

    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    pub fn now_playing(&self) -> Option<Track> {
        self.inner.lock().now_playing.clone()
    }

    pub fn set_now_playing(&self, track: Option<Track>) {
        self.inner.lock().now_playing = track;
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().volume
    }

    pub fn set_volume(&self, volume: f32) -> f32 {
        let volume = volume.clamp(0.0, 1.0);
        self.inner.lock().volume = volume;
        volume
    }

    pub fn debug_enabled(&self) -> bool {
        self.inner.lock().debug
    }

    pub fn set_debug(&self, enabled: bool) {
        self.inner.lock().debug = enabled;
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.inner.lock().phase
    }

    pub fn set_phase(&self, phase: SchedulerPhase) {
        self.inner.lock().phase = phase;
    }

    pub fn session(&self) -> Option<PlaybackSession> {
        self.inner.lock().session.clone()
    }

    pub fn bind_session(&self, session: PlaybackSession) {
        self.inner.lock().session = Some(session);
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let inner = self.inner.lock();
        QueueSnapshot {
            now_playing: inner.now_playing.clone(),
            tracks: inner.tracks.iter().cloned().collect(),
            volume: inner.volume,
            debug: inner.debug,
            phase: inner.phase,
        }
    }

    /// Starts a scheduler through `spawn` unless a live one already exists.
    ///
    /// The check and the store happen under the same lock, so concurrent
    /// callers can never both spawn. When a live scheduler exists the call
    /// only sets the wake signal (still under the lock, so a shutting-down
    /// scheduler sees it) and returns `false`.
    pub(crate) fn claim_scheduler(&self, spawn: impl FnOnce(u64) -> JoinHandle<()>) -> bool {
        let mut inner = self.inner.lock();
        let alive = matches!(&inner.scheduler, SchedulerSlot::Running { task, .. } if !task.is_finished());

        if alive {
            self.wake.set();
            return false;
        }

        inner.scheduler_seq += 1;
        let id = inner.scheduler_seq;
        let task = spawn(id);
        inner.scheduler = SchedulerSlot::Running { id, task };
        true
    }

    /// Whether `id` is the scheduler this guild currently trusts.
    pub(crate) fn is_current_scheduler(&self, id: u64) -> bool {
        matches!(&self.inner.lock().scheduler, SchedulerSlot::Running { id: current, .. } if *current == id)
    }

    /// Clears the slot only if it still refers to `id`.
    pub(crate) fn release_scheduler(&self, id: u64) {
        let mut inner = self.inner.lock();
        if matches!(&inner.scheduler, SchedulerSlot::Running { id: current, .. } if *current == id) {
            inner.scheduler = SchedulerSlot::NotRunning;
            inner.phase = SchedulerPhase::Idle;
            inner.now_playing = None;
            debug!("🔚 Scheduler {} liberado en guild {}", id, self.guild_id);
        }
    }

    /// Whether an idle shutdown must be abandoned: new work arrived
    /// (tracks, when `require_empty`) or someone woke the scheduler.
    pub(crate) fn shutdown_blocked(&self, require_empty: bool) -> bool {
        let inner = self.inner.lock();
        self.blocked(&inner, require_empty)
    }

    fn blocked(&self, inner: &QueueInner, require_empty: bool) -> bool {
        (require_empty && !inner.tracks.is_empty()) || self.wake.is_set()
    }

    /// Gives up the slot once an idle shutdown is complete.
    ///
    /// Refuses (returns `false`) when [`shutdown_blocked`](Self::shutdown_blocked)
    /// holds. The check and the release share the lock with
    /// `claim_scheduler`, so an enqueue either lands before (and keeps this
    /// scheduler alive) or after (and spawns a fresh one).
    pub(crate) fn retire_scheduler(&self, id: u64, require_empty: bool) -> bool {
        let mut inner = self.inner.lock();
        if self.blocked(&inner, require_empty) {
            return false;
        }
        if matches!(&inner.scheduler, SchedulerSlot::Running { id: current, .. } if *current == id) {
            inner.scheduler = SchedulerSlot::NotRunning;
            inner.phase = SchedulerPhase::Idle;
            inner.now_playing = None;
        }
        true
    }

    pub fn is_scheduler_running(&self) -> bool {
        matches!(&self.inner.lock().scheduler, SchedulerSlot::Running { task, .. } if !task.is_finished())
    }
}
