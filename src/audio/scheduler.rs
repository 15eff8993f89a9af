use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::{
    queue::{GuildQueue, SchedulerPhase},
    resolver::Resolver,
    track::Track,
    transport::{OnFinished, PlaybackSession},
};
use crate::error::PlaybackError;

/// Operator-tunable scheduler limits.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// How long an empty queue is kept before disconnecting
    pub idle_timeout: Duration,
    pub transport_poll_attempts: u32,
    pub transport_poll_interval: Duration,
    /// Cap on tracks accepted from a single enqueue request
    pub max_enqueue_per_request: usize,
    pub default_volume: f32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            transport_poll_attempts: 50,
            transport_poll_interval: Duration::from_millis(200),
            max_enqueue_per_request: 25,
            default_volume: 0.8,
        }
    }
}

/// The playback loop of one guild.
///
/// At most one instance runs per guild; see [`GuildQueue::claim_scheduler`].
pub struct GuildScheduler {
    id: u64,
    queue: Arc<GuildQueue>,
    resolver: Arc<Resolver>,
    settings: SchedulerSettings,
}

/// Releases the scheduler slot even if the loop panics.
struct SlotRelease {
    queue: Arc<GuildQueue>,
    id: u64,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        self.queue.release_scheduler(self.id);
    }
}

impl GuildScheduler {
    /// Starts a scheduler for `queue`, or just wakes the running one.
    ///
    /// Returns `true` when a new scheduler task was spawned.
    pub fn start(queue: &Arc<GuildQueue>, resolver: &Arc<Resolver>, settings: &SchedulerSettings) -> bool {
        let started = queue.claim_scheduler(|id| {
            let scheduler = Self {
                id,
                queue: queue.clone(),
                resolver: resolver.clone(),
                settings: settings.clone(),
            };
            tokio::spawn(scheduler.run())
        });

        if started {
            debug!("🚀 Scheduler lanzado para guild {}", queue.guild_id());
        }
        started
    }

    async fn run(self) {
        if !self.queue.is_current_scheduler(self.id) {
            // Otra instancia es la autoritativa: salir sin tocar el estado
            debug!("Scheduler {} reemplazado en guild {}, saliendo", self.id, self.queue.guild_id());
            return;
        }

        let _release = SlotRelease {
            queue: self.queue.clone(),
            id: self.id,
        };

        info!("▶️ Scheduler {} iniciado en guild {}", self.id, self.queue.guild_id());
        self.queue.set_phase(SchedulerPhase::WaitingForItem);
        self.drive().await;
        info!("⏹️ Scheduler {} terminado en guild {}", self.id, self.queue.guild_id());
    }

    async fn drive(&self) {
        loop {
            self.queue.wake().clear();

            if self.queue.is_empty() {
                self.queue.set_now_playing(None);
                self.queue.set_phase(SchedulerPhase::WaitingForItem);
                if !self.wait_for_wake().await && self.shut_down(true).await {
                    return;
                }
                continue;
            }

            self.queue.set_phase(SchedulerPhase::AwaitingTransport);
            let session = match self.queue.session() {
                Some(session) if self.await_transport(&session).await => session,
                unavailable => {
                    warn!("🔌 Sin conexión de voz en guild {}", self.queue.guild_id());
                    if let Some(session) = &unavailable {
                        session
                            .notifier
                            .send("🔌 Todavía no estoy conectado a un canal de voz, usa `!join` y vuelve a intentarlo".into())
                            .await;
                    }

                    // La pista sigue en la cabeza de la cola; esperar un nuevo evento
                    self.queue.set_phase(SchedulerPhase::WaitingForItem);
                    if !self.wait_for_wake().await && self.shut_down(false).await {
                        return;
                    }
                    continue;
                }
            };

            // Un stop pudo vaciar la cola mientras esperábamos
            let Some((mut track, epoch)) = self.queue.pop_front() else {
                continue;
            };

            if track.is_lazy() {
                self.queue.set_phase(SchedulerPhase::Resolving);
                self.debug(&session, format!("Resolviendo stream para: {}", track.title)).await;

                match self.resolver.resolve_single(&track.source_url, &track.requester).await {
                    Ok(resolved) => track.absorb(resolved),
                    Err(e) => {
                        warn!("⚠️ No se pudo resolver {}: {}", track.source_url, e);
                        session
                            .notifier
                            .send(format!("⚠️ No se pudo obtener el stream de **{}** ({}), saltando", track.title, e))
                            .await;
                        continue;
                    }
                }

                if self.queue.epoch() != epoch {
                    debug!("🗑️ Cola limpiada durante la resolución, descartando {}", track.title);
                    continue;
                }
            }

            self.play(&session, track, epoch).await;
        }
    }

    async fn play(&self, session: &PlaybackSession, track: Track, epoch: u64) {
        let volume = self.queue.volume();
        self.queue.set_now_playing(Some(track.clone()));

        let source = match session.transport.prepare(&track, volume) {
            Ok(source) => source,
            Err(e) => {
                error!("❌ Fuente inválida para {}: {}", track.title, e);
                session.notifier.send(format!("❌ No se pudo preparar el stream: {e}")).await;
                self.queue.set_now_playing(None);
                return;
            }
        };

        let finished = Arc::new(AtomicBool::new(false));
        let on_finished: OnFinished = {
            let finished = finished.clone();
            let wake = self.queue.wake().clone();
            let guild_id = self.queue.guild_id();
            Box::new(move |outcome: Option<PlaybackError>| {
                if let Some(e) = outcome {
                    error!("❌ Error del reproductor en guild {}: {}", guild_id, e);
                }
                finished.store(true, Ordering::Release);
                wake.set();
            })
        };

        if let Err(e) = session.transport.play(source, on_finished).await {
            error!("❌ El transporte rechazó {}: {}", track.title, e);
            session.notifier.send(format!("❌ No se puede reproducir ahora: {e}")).await;
            self.queue.set_now_playing(None);
            return;
        }

        // Un stop que llegó mientras el transporte arrancaba no encontró nada que detener
        if self.queue.epoch() != epoch {
            debug!("🗑️ Cola limpiada durante el arranque, deteniendo {}", track.title);
            session.transport.stop().await;
            self.wait_until_finished(&finished).await;
            self.queue.set_now_playing(None);
            return;
        }

        self.queue.set_phase(SchedulerPhase::Playing);
        info!("🎵 Reproduciendo: {} en guild {}", track.title, self.queue.guild_id());
        session
            .notifier
            .send(format!(
                "▶️ Reproduciendo: **{}** | pedido por **{}**\n<{}>",
                track.title, track.requester, track.source_url
            ))
            .await;
        self.debug(session, format!("Reproduciendo con volumen={volume:.2}")).await;

        self.wait_until_finished(&finished).await;
        self.queue.set_now_playing(None);
    }

    /// Blocks until the completion callback fires.
    ///
    /// Wake-ups from enqueues while playing are absorbed here; the queue is
    /// re-checked at the top of the loop anyway.
    async fn wait_until_finished(&self, finished: &AtomicBool) {
        while !finished.load(Ordering::Acquire) {
            self.queue.wake().wait().await;
            self.queue.wake().clear();
        }
    }

    /// Returns `false` on idle timeout.
    async fn wait_for_wake(&self) -> bool {
        timeout(self.settings.idle_timeout, self.queue.wake().wait())
            .await
            .is_ok()
    }

    async fn await_transport(&self, session: &PlaybackSession) -> bool {
        for attempt in 0..self.settings.transport_poll_attempts {
            if session.transport.is_connected().await {
                return true;
            }
            if attempt + 1 < self.settings.transport_poll_attempts {
                sleep(self.settings.transport_poll_interval).await;
            }
        }
        false
    }

    /// Idle shutdown. The slot stays claimed until the disconnect is done,
    /// so an enqueue meanwhile only wakes this scheduler.
    ///
    /// Returns `false` when new work arrived and the loop must go on.
    async fn shut_down(&self, announce: bool) -> bool {
        let require_empty = announce;
        self.queue.set_phase(SchedulerPhase::Terminating);
        info!("💤 Guild {} inactiva, cerrando scheduler {}", self.queue.guild_id(), self.id);

        if let Some(session) = self.queue.session() {
            if session.transport.is_connected().await {
                if announce {
                    session
                        .notifier
                        .send("⏹️ No hay canciones en la cola, me voy del canal de voz".into())
                        .await;
                }
                if self.queue.shutdown_blocked(require_empty) {
                    info!("↩️ Nueva petición en guild {}, se cancela la salida", self.queue.guild_id());
                    return false;
                }
                session.transport.disconnect().await;
            }
        }

        self.queue.retire_scheduler(self.id, require_empty)
    }

    async fn debug(&self, session: &PlaybackSession, msg: String) {
        debug!("{}", msg);
        if self.queue.debug_enabled() {
            session.notifier.send(format!("`[debug]` {msg}")).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        audio::{
            registry::SchedulerRegistry,
            transport::{Notifier, PlaybackSource, Transport},
        },
        error::{PlaybackError, ResolutionError, TransportError},
        sources::{Extractor, FlatListing, StreamInfo},
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serenity::model::id::GuildId;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    #[derive(Default)]
    pub(crate) struct FakeTransport {
        pub connected: AtomicBool,
        pub auto_finish: AtomicBool,
        pub plays: Mutex<Vec<String>>,
        pending: Mutex<Option<OnFinished>>,
        pub stops: AtomicUsize,
        pub disconnects: AtomicUsize,
        pub volumes: Mutex<Vec<f32>>,
        /// `stop` halts audio but the end event never arrives
        pub silent_stop: AtomicBool,
        /// Number of upcoming `play` calls to reject
        pub reject_plays: AtomicUsize,
        /// Time `play` takes before the track is registered
        pub play_delay: Mutex<Option<Duration>>,
    }

    impl FakeTransport {
        pub fn connected() -> Arc<Self> {
            let transport = Self::default();
            transport.connected.store(true, Ordering::SeqCst);
            Arc::new(transport)
        }

        pub fn finish_current(&self, outcome: Option<PlaybackError>) {
            let callback = self.pending.lock().take();
            if let Some(callback) = callback {
                callback(outcome);
            }
        }

        pub fn play_count(&self) -> usize {
            self.plays.lock().len()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn play(&self, source: PlaybackSource, on_finished: OnFinished) -> Result<(), TransportError> {
            let rejected = self
                .reject_plays
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if rejected {
                return Err(TransportError::Play("driver ocupado".into()));
            }

            self.plays.lock().push(source.url.to_string());
            let delay = *self.play_delay.lock();
            if let Some(delay) = delay {
                sleep(delay).await;
            }

            if self.auto_finish.load(Ordering::SeqCst) {
                on_finished(None);
            } else {
                *self.pending.lock() = Some(on_finished);
            }
            Ok(())
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if !self.silent_stop.load(Ordering::SeqCst) {
                self.finish_current(None);
            }
        }

        async fn is_playing(&self) -> bool {
            self.pending.lock().is_some()
        }

        async fn pause(&self) -> bool {
            self.pending.lock().is_some()
        }

        async fn resume(&self) -> bool {
            self.pending.lock().is_some()
        }

        async fn set_volume(&self, volume: f32) {
            self.volumes.lock().push(volume);
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
            self.finish_current(None);
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeNotifier {
        pub messages: Mutex<Vec<String>>,
        /// Messages containing the text take the given time to deliver
        pub slow: Mutex<Option<(&'static str, Duration)>>,
    }

    impl FakeNotifier {
        pub fn saw(&self, needle: &str) -> bool {
            self.messages.lock().iter().any(|m| m.contains(needle))
        }
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn send(&self, text: String) {
            let delay = self
                .slow
                .lock()
                .and_then(|(needle, delay)| text.contains(needle).then_some(delay));
            self.messages.lock().push(text);
            if let Some(delay) = delay {
                sleep(delay).await;
            }
        }
    }

    /// Resolves everything except the queries listed in `failing`.
    #[derive(Default)]
    pub(crate) struct FakeExtractor {
        pub calls: Mutex<Vec<String>>,
        pub failing: Vec<String>,
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract_flat(&self, _query: &str) -> Result<FlatListing, ResolutionError> {
            Ok(FlatListing::Single)
        }

        async fn extract_stream(&self, query: &str) -> Result<StreamInfo, ResolutionError> {
            self.calls.lock().push(query.to_string());
            if self.failing.iter().any(|f| f == query) {
                return Err(ResolutionError::Extractor("Video unavailable".into()));
            }
            let slug = query.rsplit('=').next().unwrap_or(query);
            Ok(StreamInfo {
                stream_url: format!("https://cdn.example/{slug}"),
                title: format!("{slug} (resuelta)"),
                page_url: query.to_string(),
                headers: HashMap::new(),
            })
        }
    }

    pub(crate) fn resolved(name: &str) -> Track {
        let mut track = Track::lazy(name, format!("https://www.youtube.com/watch?v={name}"), "ana");
        track.stream_url = Some(format!("https://cdn.example/{name}"));
        track
    }

    pub(crate) fn lazy(name: &str) -> Track {
        Track::lazy(format!("{name} (pendiente)"), format!("https://www.youtube.com/watch?v={name}"), "ana")
    }

    pub(crate) struct Harness {
        pub registry: Arc<SchedulerRegistry>,
        pub transport: Arc<FakeTransport>,
        pub notifier: Arc<FakeNotifier>,
        pub extractor: Arc<FakeExtractor>,
        pub guild: GuildId,
    }

    impl Harness {
        pub fn new(transport: Arc<FakeTransport>, extractor: FakeExtractor) -> Self {
            let extractor = Arc::new(extractor);
            let resolver = Arc::new(Resolver::new(extractor.clone()));
            Self {
                registry: Arc::new(SchedulerRegistry::new(resolver, SchedulerSettings::default())),
                transport,
                notifier: Arc::new(FakeNotifier::default()),
                extractor,
                guild: GuildId::new(42),
            }
        }

        pub fn session(&self) -> PlaybackSession {
            PlaybackSession::new(self.transport.clone(), self.notifier.clone())
        }

        pub fn enqueue(&self, tracks: Vec<Track>) -> crate::audio::registry::EnqueueOutcome {
            self.registry.enqueue(self.guild, tracks, self.session())
        }

        pub fn queue(&self) -> Arc<GuildQueue> {
            self.registry.get(self.guild)
        }
    }

    pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..3000 {
            if condition() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("la condición nunca se cumplió");
    }

    #[tokio::test(start_paused = true)]
    async fn single_track_starts_playing_immediately() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());

        let outcome = h.enqueue(vec![resolved("song-x")]);
        assert!(outcome.started);

        eventually(|| h.queue().phase() == SchedulerPhase::Playing).await;
        assert_eq!(h.transport.play_count(), 1);
        assert_eq!(h.queue().now_playing().map(|t| t.title), Some("song-x".to_string()));
        assert!(h.notifier.saw("Reproduciendo: **song-x**"));
        assert!(h.extractor.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lazy_tracks_resolve_only_at_head() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());
        h.enqueue(vec![resolved("a"), lazy("b"), lazy("c")]);

        eventually(|| h.transport.play_count() == 1).await;
        assert!(h.extractor.calls.lock().is_empty());
        assert!(h.queue().snapshot().tracks.iter().all(Track::is_lazy));

        h.transport.finish_current(None);
        eventually(|| h.transport.play_count() == 2).await;

        assert_eq!(*h.extractor.calls.lock(), vec!["https://www.youtube.com/watch?v=b".to_string()]);
        assert_eq!(h.queue().now_playing().map(|t| t.title), Some("b (resuelta)".to_string()));
        let remaining = h.queue().snapshot().tracks;
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].is_lazy());
    }

    #[tokio::test(start_paused = true)]
    async fn plays_in_enqueue_order() {
        let transport = FakeTransport::connected();
        transport.auto_finish.store(true, Ordering::SeqCst);
        let h = Harness::new(transport, FakeExtractor::default());

        h.enqueue(["t1", "t2", "t3", "t4", "t5"].map(resolved).to_vec());
        h.enqueue(vec![lazy("t6"), resolved("t7")]);

        eventually(|| h.transport.play_count() == 7).await;
        let expected: Vec<String> = (1..=7).map(|i| format!("https://cdn.example/t{i}")).collect();
        assert_eq!(*h.transport.plays.lock(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_queue_and_playback() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());
        h.enqueue(vec![resolved("a"), resolved("b"), lazy("c")]);
        eventually(|| h.queue().phase() == SchedulerPhase::Playing).await;

        let removed = h.registry.stop(h.guild).await;

        assert_eq!(removed, 2);
        assert!(h.queue().is_empty());
        assert!(h.queue().now_playing().is_none());
        assert_eq!(h.transport.stops.load(Ordering::SeqCst), 1);

        eventually(|| h.queue().phase() == SchedulerPhase::WaitingForItem).await;
        assert_eq!(h.transport.play_count(), 1);
        assert!(h.queue().is_scheduler_running());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_resolution_skips_to_next_track() {
        let transport = FakeTransport::connected();
        transport.auto_finish.store(true, Ordering::SeqCst);
        let extractor = FakeExtractor {
            failing: vec!["https://www.youtube.com/watch?v=bad".to_string()],
            ..Default::default()
        };
        let h = Harness::new(transport, extractor);

        h.enqueue(vec![resolved("a"), lazy("bad"), lazy("good")]);

        eventually(|| h.transport.play_count() == 2).await;
        assert_eq!(
            *h.transport.plays.lock(),
            vec!["https://cdn.example/a".to_string(), "https://cdn.example/good".to_string()]
        );
        assert!(h.notifier.saw("No se pudo obtener el stream de **bad (pendiente)**"));
        assert!(h.queue().is_scheduler_running());
    }

    #[tokio::test(start_paused = true)]
    async fn playback_error_is_not_fatal() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());
        h.enqueue(vec![resolved("a"), resolved("b")]);
        eventually(|| h.transport.play_count() == 1).await;

        h.transport.finish_current(Some(PlaybackError("decoder blew up".into())));

        eventually(|| h.transport.play_count() == 2).await;
        assert!(h.queue().is_scheduler_running());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_disconnects_exactly_once() {
        let transport = FakeTransport::connected();
        transport.auto_finish.store(true, Ordering::SeqCst);
        let h = Harness::new(transport, FakeExtractor::default());

        h.enqueue(vec![resolved("a")]);
        eventually(|| h.transport.play_count() == 1 && h.queue().phase() == SchedulerPhase::WaitingForItem).await;
        assert_eq!(h.transport.disconnects.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(301)).await;
        assert_eq!(h.transport.disconnects.load(Ordering::SeqCst), 1);
        assert!(h.notifier.saw("me voy del canal de voz"));
        assert!(!h.queue().is_scheduler_running());
        assert_eq!(h.queue().phase(), SchedulerPhase::Idle);

        sleep(Duration::from_secs(900)).await;
        assert_eq!(h.transport.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_wakes_a_waiting_scheduler() {
        let transport = FakeTransport::connected();
        transport.auto_finish.store(true, Ordering::SeqCst);
        let h = Harness::new(transport, FakeExtractor::default());

        h.enqueue(vec![resolved("a")]);
        eventually(|| h.queue().phase() == SchedulerPhase::WaitingForItem && h.transport.play_count() == 1).await;
        sleep(Duration::from_secs(120)).await;

        let outcome = h.enqueue(vec![resolved("b")]);
        assert!(!outcome.started);
        eventually(|| h.transport.play_count() == 2).await;

        // El timeout se reinicia con cada espera
        sleep(Duration::from_secs(250)).await;
        assert!(h.queue().is_scheduler_running());
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_transport_keeps_track_at_head() {
        let transport = Arc::new(FakeTransport::default());
        let h = Harness::new(transport, FakeExtractor::default());

        let tracks: Vec<Track> = (0..30).map(|i| resolved(&format!("t{i}"))).collect();
        let outcome = h.enqueue(tracks);
        assert_eq!(outcome.added, 25);
        assert_eq!(outcome.dropped, 5);
        assert_eq!(h.queue().len(), 25);

        eventually(|| h.notifier.saw("no estoy conectado")).await;
        assert_eq!(h.queue().len(), 25);
        assert_eq!(h.transport.play_count(), 0);

        h.transport.connected.store(true, Ordering::SeqCst);
        assert!(!h.registry.start(h.guild));
        eventually(|| h.transport.play_count() == 1).await;
        assert_eq!(*h.transport.plays.lock(), vec!["https://cdn.example/t0".to_string()]);
        assert_eq!(h.queue().len(), 24);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_transport_idles_out_without_dropping_tracks() {
        let h = Harness::new(Arc::new(FakeTransport::default()), FakeExtractor::default());
        h.enqueue(vec![resolved("a"), resolved("b")]);

        sleep(Duration::from_secs(400)).await;
        assert!(!h.queue().is_scheduler_running());
        assert_eq!(h.queue().len(), 2);

        // Un nuevo enqueue levanta un scheduler nuevo que retoma la cola
        h.transport.connected.store(true, Ordering::SeqCst);
        assert!(h.enqueue(vec![resolved("c")]).started);
        eventually(|| h.transport.play_count() == 1).await;
        assert_eq!(*h.transport.plays.lock(), vec!["https://cdn.example/a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn debug_mode_mirrors_into_chat() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());
        h.registry.set_debug(h.guild, true);

        h.enqueue(vec![resolved("a")]);
        eventually(|| h.notifier.saw("`[debug]` Reproduciendo con volumen=0.80")).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_enqueues_start_a_single_scheduler() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());
        let registry = h.registry.clone();
        let session = h.session();

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let registry = registry.clone();
                let session = session.clone();
                tokio::spawn(async move { registry.enqueue(GuildId::new(42), vec![resolved(&format!("t{i}"))], session) })
            })
            .collect();

        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap().started {
                started += 1;
            }
        }
        assert_eq!(started, 1);

        eventually(|| h.transport.play_count() == 1).await;
        assert_eq!(h.queue().len(), 31);
    }

    #[tokio::test(start_paused = true)]
    async fn start_on_running_scheduler_only_sets_wake() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());
        h.enqueue(vec![resolved("a"), resolved("b")]);
        eventually(|| h.queue().phase() == SchedulerPhase::Playing).await;

        let before = h.queue().snapshot();
        h.queue().wake().clear();
        assert!(!h.registry.start(h.guild));

        let after = h.queue().snapshot();
        assert!(h.queue().wake().is_set());
        assert_eq!(after.tracks, before.tracks);
        assert_eq!(after.now_playing, before.now_playing);
        assert_eq!(after.phase, before.phase);
        assert_eq!(h.transport.play_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_during_idle_shutdown_keeps_the_connection() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());
        h.enqueue(vec![resolved("a")]);
        eventually(|| h.transport.play_count() == 1).await;
        h.transport.finish_current(None);
        eventually(|| h.queue().phase() == SchedulerPhase::WaitingForItem).await;

        *h.notifier.slow.lock() = Some(("me voy", Duration::from_secs(2)));
        sleep(Duration::from_secs(300)).await;
        eventually(|| h.notifier.saw("me voy")).await;
        assert_eq!(h.queue().phase(), SchedulerPhase::Terminating);

        // El scheduler que se apaga sigue siendo el único: solo se le despierta
        let outcome = h.enqueue(vec![resolved("b")]);
        assert!(!outcome.started);

        eventually(|| h.transport.play_count() == 2).await;
        assert_eq!(h.transport.disconnects.load(Ordering::SeqCst), 0);
        assert_eq!(h.queue().phase(), SchedulerPhase::Playing);
        assert_eq!(h.queue().now_playing().map(|t| t.title), Some("b".to_string()));
        assert!(h.transport.connected.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn leave_unblocks_playback_when_end_event_is_lost() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());
        h.transport.silent_stop.store(true, Ordering::SeqCst);
        h.enqueue(vec![resolved("a")]);
        eventually(|| h.queue().phase() == SchedulerPhase::Playing).await;

        h.registry.leave(h.guild).await;

        eventually(|| h.queue().phase() == SchedulerPhase::WaitingForItem).await;
        assert!(h.queue().now_playing().is_none());

        // Un nuevo enqueue vuelve a reproducir
        h.transport.connected.store(true, Ordering::SeqCst);
        h.enqueue(vec![resolved("b")]);
        eventually(|| h.transport.play_count() == 2).await;
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_source_is_reported_and_skipped() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());
        let mut broken = resolved("roto");
        broken.stream_url = Some("esto no es una url".to_string());

        h.enqueue(vec![broken, resolved("b")]);

        eventually(|| h.transport.play_count() == 1).await;
        assert!(h.notifier.saw("❌ No se pudo preparar el stream"));
        assert!(!h.notifier.saw("Reproduciendo: **roto**"));
        assert_eq!(*h.transport.plays.lock(), vec!["https://cdn.example/b".to_string()]);
        assert_eq!(h.queue().now_playing().map(|t| t.title), Some("b".to_string()));
        assert!(h.queue().is_scheduler_running());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_play_moves_to_next_track() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());
        h.transport.reject_plays.store(1, Ordering::SeqCst);

        h.enqueue(vec![resolved("a"), resolved("b")]);

        eventually(|| h.transport.play_count() == 1).await;
        assert!(h.notifier.saw("❌ No se puede reproducir ahora"));
        assert!(!h.notifier.saw("Reproduciendo: **a**"));
        assert_eq!(*h.transport.plays.lock(), vec!["https://cdn.example/b".to_string()]);
        assert_eq!(h.queue().now_playing().map(|t| t.title), Some("b".to_string()));
        assert!(h.queue().is_scheduler_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_playback_start_halts_the_track() {
        let h = Harness::new(FakeTransport::connected(), FakeExtractor::default());
        *h.transport.play_delay.lock() = Some(Duration::from_secs(1));

        h.enqueue(vec![resolved("a"), resolved("b")]);
        eventually(|| h.transport.play_count() == 1).await;

        // play() todavía no registró la pista: este stop no encuentra nada
        assert_eq!(h.registry.stop(h.guild).await, 1);

        eventually(|| h.queue().phase() == SchedulerPhase::WaitingForItem).await;
        assert_eq!(h.transport.stops.load(Ordering::SeqCst), 2);
        assert!(!h.transport.is_playing().await);
        assert!(h.queue().now_playing().is_none());
        assert!(!h.notifier.saw("Reproduciendo: **a**"));
        assert_eq!(h.transport.play_count(), 1);
    }
}
