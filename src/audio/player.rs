use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, error, info, warn};

use super::{
    clock::PlaybackClock,
    engine::{AudioEngine, PlayRequest},
    error::{PlayerError, PlayerResult},
    loader::BackgroundLoader,
    manager::{GuildQueueState, GuildSession, PlaybackPhase, QueueManager, SessionEvent},
    queue::{RemoveSelector, Track},
    retry::RetryPolicy,
    voice::VoiceSession,
};
use crate::{
    notifier::Notifier,
    sources::{self, Lookup, SearchHit, TrackResolver},
};

pub const MAX_VOLUME: f32 = 1.5;

/// Tunables of the playback core.
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub start_policy: RetryPolicy,
    /// How long a drained queue waits for the background loader.
    pub loader_wait: Duration,
    pub loader_pace: Duration,
    pub default_volume: f32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            start_policy: RetryPolicy::default(),
            loader_wait: Duration::from_secs(10),
            loader_pace: Duration::from_millis(100),
            default_volume: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// Handed straight to the controller; `pending` entries are still loading.
    NowPlaying { track: Track, pending: usize },
    Queued { track: Track, position: usize },
    /// Everything went to the background loader.
    Loading { pending: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Removed {
    Track(Track),
    Cleared { tracks: usize, pending: usize },
}

/// Snapshot for `/queue` and `/nowplaying`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStatus {
    pub current: Option<Track>,
    pub position: Option<Duration>,
    pub phase: PlaybackPhase,
    pub queue: Vec<Track>,
    pub pending: usize,
    pub loader_active: bool,
    pub volume: f32,
}

impl QueueStatus {
    pub fn is_paused(&self) -> bool {
        self.phase == PlaybackPhase::Paused
    }
}

struct PlayerInner {
    manager: QueueManager,
    resolver: Arc<dyn TrackResolver>,
    engine: Arc<dyn AudioEngine>,
    voice: Arc<dyn VoiceSession>,
    notifier: Arc<dyn Notifier>,
    settings: PlayerSettings,
}

impl PlayerInner {
    /// Spawns a loader if there is pending work and none is running.
    /// Must be called with the guild lock held.
    fn ensure_loader(&self, state: &mut GuildQueueState, session: &Arc<GuildSession>) {
        if state.queue.pending_len() > 0 && !state.loader_active() {
            let handle = BackgroundLoader::spawn(
                session.clone(),
                self.resolver.clone(),
                self.settings.loader_pace,
            );
            state.install_loader(handle);
        }
    }

    async fn notify(&self, guild_id: GuildId, text: impl Into<String>) {
        self.notifier.send(guild_id, text.into()).await;
    }
}

/// Entry point of the playback core for the command layer.
///
/// Every guild gets its own session and coordinator task, created on first
/// use. User operations act under the guild lock; queue advancement only
/// ever happens on the coordinator.
#[derive(Clone)]
pub struct AudioPlayer {
    inner: Arc<PlayerInner>,
}

impl AudioPlayer {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        engine: Arc<dyn AudioEngine>,
        voice: Arc<dyn VoiceSession>,
        notifier: Arc<dyn Notifier>,
        settings: PlayerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(PlayerInner {
                manager: QueueManager::new(settings.default_volume),
                resolver,
                engine,
                voice,
                notifier,
                settings,
            }),
        }
    }

    fn session(&self, guild_id: GuildId) -> Arc<GuildSession> {
        let session = self.inner.manager.get_or_create(guild_id);
        if let Some(events) = session.take_events() {
            let controller = PlaybackController {
                inner: self.inner.clone(),
                session: session.clone(),
            };
            tokio::spawn(controller.run(events));
            debug!(
                guild_id = %guild_id,
                "Coordinator started ({} active guild session(s))",
                self.inner.manager.len()
            );
        }
        session
    }

    /// Joins (or moves to) a voice channel and picks up any queued tracks.
    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> PlayerResult<()> {
        let voice = &self.inner.voice;
        let connected = voice.is_connected(guild_id).await;
        match voice.current_channel(guild_id).await {
            Some(current) if connected && current == channel_id => return Ok(()),
            Some(_) if connected => voice.move_to(guild_id, channel_id).await?,
            _ => voice.connect(guild_id, channel_id).await?,
        }

        self.resume_session(guild_id).await;
        Ok(())
    }

    pub async fn voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        if self.inner.voice.is_connected(guild_id).await {
            self.inner.voice.current_channel(guild_id).await
        } else {
            None
        }
    }

    pub async fn search(&self, query: &str, limit: usize) -> PlayerResult<Vec<SearchHit>> {
        self.inner.resolver.search(query, limit).await
    }

    pub async fn enqueue(&self, guild_id: GuildId, raw: &str) -> PlayerResult<EnqueueOutcome> {
        let raw = raw.trim();
        let session = self.session(guild_id);

        let lookup = if sources::is_url(raw) {
            self.inner.resolver.expand(raw).await?
        } else {
            Lookup::Single(raw.to_string())
        };

        match lookup {
            Lookup::Single(identifier) => self.enqueue_single(&session, &identifier).await,
            Lookup::Playlist { title, entries } => {
                info!(
                    guild_id = %guild_id,
                    "📋 Enqueueing playlist {:?} ({} entries)",
                    title,
                    entries.len()
                );
                self.enqueue_playlist(&session, entries).await
            }
        }
    }

    async fn enqueue_single(
        &self,
        session: &Arc<GuildSession>,
        identifier: &str,
    ) -> PlayerResult<EnqueueOutcome> {
        let track = self.inner.resolver.resolve(identifier).await?;

        let mut state = session.lock().await;
        if state.is_busy() {
            let position = session.enqueue(&mut state, track.clone());
            return Ok(EnqueueOutcome::Queued { track, position });
        }

        state.phase = PlaybackPhase::Starting;
        session.send(SessionEvent::Play(track.clone()));
        Ok(EnqueueOutcome::NowPlaying {
            track,
            pending: state.queue.pending_len(),
        })
    }

    async fn enqueue_playlist(
        &self,
        session: &Arc<GuildSession>,
        entries: Vec<String>,
    ) -> PlayerResult<EnqueueOutcome> {
        let mut entries = entries.into_iter();
        let Some(first) = entries.next() else {
            return Err(PlayerError::NoResults("playlist".into()));
        };

        let epoch = {
            let mut state = session.lock().await;
            if state.is_busy() {
                let pending = state.queue.push_pending(std::iter::once(first).chain(entries));
                self.inner.ensure_loader(&mut state, session);
                return Ok(EnqueueOutcome::Loading { pending });
            }
            // Reserve the session while the first entry resolves.
            state.phase = PlaybackPhase::Starting;
            state.epoch
        };

        let resolved = self.inner.resolver.resolve(&first).await;

        let mut state = session.lock().await;
        if state.epoch != epoch {
            info!(
                guild_id = %session.guild_id(),
                "⏹️ Session ended while the playlist was starting, dropping it"
            );
            return Err(PlayerError::Interrupted);
        }
        match resolved {
            Ok(track) => {
                let pending = state.queue.push_pending(entries);
                self.inner.ensure_loader(&mut state, session);
                match state.phase {
                    PlaybackPhase::Starting | PlaybackPhase::Idle | PlaybackPhase::Finished => {
                        state.phase = PlaybackPhase::Starting;
                        session.send(SessionEvent::Play(track.clone()));
                        Ok(EnqueueOutcome::NowPlaying { track, pending })
                    }
                    _ => {
                        let position = session.enqueue(&mut state, track.clone());
                        Ok(EnqueueOutcome::Queued { track, position })
                    }
                }
            }
            Err(e) => {
                warn!(
                    guild_id = %session.guild_id(),
                    "⚠️ First playlist entry failed, handing it to the loader: {}", e
                );
                state.queue.push_pending_front(first);
                let pending = state.queue.push_pending(entries);
                self.inner.ensure_loader(&mut state, session);
                if state.phase == PlaybackPhase::Starting {
                    session.send(SessionEvent::StartNext);
                }
                Ok(EnqueueOutcome::Loading { pending })
            }
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> PlayerResult<Track> {
        let session = self.session(guild_id);
        let mut state = session.lock().await;
        match state.phase {
            PlaybackPhase::Playing => {}
            PlaybackPhase::Paused => return Err(PlayerError::AlreadyPaused),
            _ => return Err(PlayerError::NothingPlaying),
        }
        let track = state.current.clone().ok_or(PlayerError::NothingPlaying)?;

        self.inner.engine.pause(guild_id).await?;
        if let Some(clock) = state.clock.as_mut() {
            clock.pause(Instant::now());
        }
        state.phase = PlaybackPhase::Paused;

        info!(guild_id = %guild_id, "⏸️ Paused");
        Ok(track)
    }

    pub async fn resume(&self, guild_id: GuildId) -> PlayerResult<Track> {
        let session = self.session(guild_id);
        let mut state = session.lock().await;
        match state.phase {
            PlaybackPhase::Paused => {}
            PlaybackPhase::Playing => return Err(PlayerError::NotPaused),
            _ => return Err(PlayerError::NothingPlaying),
        }
        let track = state.current.clone().ok_or(PlayerError::NothingPlaying)?;

        self.inner.engine.resume(guild_id).await?;
        if let Some(clock) = state.clock.as_mut() {
            clock.resume(Instant::now());
        }
        state.phase = PlaybackPhase::Playing;

        info!(guild_id = %guild_id, "▶️ Resumed");
        Ok(track)
    }

    /// Restarts the current track at `target`; returns the clamped target.
    /// A seek always leaves the track playing, even if it was paused.
    ///
    /// The restart opens a new stream, so the guild lock is released while it
    /// runs. Anything that ends the session meanwhile wins over the seek.
    pub async fn seek(&self, guild_id: GuildId, target: Duration) -> PlayerResult<Duration> {
        let session = self.session(guild_id);

        let (track, target, generation, volume) = {
            let mut state = session.lock().await;
            let track = match (&state.current, state.phase) {
                (Some(track), PlaybackPhase::Playing | PlaybackPhase::Paused) => track.clone(),
                _ => return Err(PlayerError::NothingPlaying),
            };
            let target = track.duration.map_or(target, |duration| target.min(duration));

            let previous_phase = state.phase;
            state.phase = PlaybackPhase::Seeking;
            state.suppress_completion = Some(state.generation);
            if let Err(e) = self.inner.engine.stop(guild_id).await {
                state.suppress_completion = None;
                state.phase = previous_phase;
                return Err(e);
            }

            state.generation += 1;
            (track, target, state.generation, state.volume)
        };

        let request = PlayRequest {
            stream_url: track.stream_url.clone(),
            start_offset: Some(target),
            volume,
        };
        let played = self
            .inner
            .engine
            .play(guild_id, request, session.completion(generation))
            .await;

        let mut state = session.lock().await;
        if state.generation != generation || state.phase != PlaybackPhase::Seeking {
            debug!(guild_id = %guild_id, "Session changed during seek restart");
            if played.is_ok() && state.generation == generation && state.current.is_none() {
                // Stopped or disconnected meanwhile: silence the restarted stream.
                state.suppress_completion = Some(generation);
                drop(state);
                if let Err(e) = self.inner.engine.stop(guild_id).await {
                    debug!(guild_id = %guild_id, "Engine stop after cancelled seek: {}", e);
                }
            }
            return Err(played.err().unwrap_or(PlayerError::NothingPlaying));
        }

        match played {
            Ok(()) => {
                let now = Instant::now();
                state
                    .clock
                    .get_or_insert_with(|| PlaybackClock::start(now))
                    .seek(now, target);
                state.phase = PlaybackPhase::Playing;
                info!(guild_id = %guild_id, "⏩ Seeked {} to {:?}", track.title, target);
                Ok(target)
            }
            Err(e) => {
                error!(guild_id = %guild_id, "❌ Seek restart failed for {}: {}", track.title, e);
                state.reset_playback();
                state.phase = PlaybackPhase::Idle;
                drop(state);
                session.send(SessionEvent::StartNext);
                self.inner
                    .notify(
                        guild_id,
                        format!("❌ Failed to play: **{}** - Skipping...", track.title),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Stops the current track; the coordinator moves on to the next one.
    pub async fn skip(&self, guild_id: GuildId) -> PlayerResult<Track> {
        let session = self.session(guild_id);
        let state = session.lock().await;
        let track = state.current.clone().ok_or(PlayerError::NothingPlaying)?;

        self.inner.engine.stop(guild_id).await?;
        info!(guild_id = %guild_id, "⏭️ Skipped {}", track.title);
        Ok(track)
    }

    pub async fn remove(&self, guild_id: GuildId, selector: RemoveSelector) -> PlayerResult<Removed> {
        let session = self.session(guild_id);
        let mut state = session.lock().await;

        if selector == RemoveSelector::All {
            // A loader may be resolving its last identifier with both queues empty.
            if state.queue.is_empty() && state.queue.pending_len() == 0 && !state.loader_active() {
                return Err(PlayerError::EmptyQueue);
            }
            drop(state);
            let (tracks, pending) = self.inner.manager.clear(guild_id).await;
            return Ok(Removed::Cleared { tracks, pending });
        }

        state.queue.remove(&selector).map(Removed::Track)
    }

    /// Clears everything, stops playback and leaves voice; returns the
    /// `(tracks, pending)` counts dropped.
    pub async fn stop(&self, guild_id: GuildId) -> PlayerResult<(usize, usize)> {
        let session = self.session(guild_id);
        let cleared = {
            let mut state = session.lock().await;
            let cleared = state.clear_queues();
            if state.current.is_some() {
                state.suppress_completion = Some(state.generation);
                if let Err(e) = self.inner.engine.stop(guild_id).await {
                    state.suppress_completion = None;
                    warn!(guild_id = %guild_id, "⚠️ Engine stop failed: {}", e);
                }
            }
            state.reset_playback();
            state.phase = PlaybackPhase::Finished;
            state.epoch += 1;
            cleared
        };
        session.wake().pulse();

        self.inner.voice.disconnect(guild_id).await?;
        info!(guild_id = %guild_id, "⏹️ Stopped");
        Ok(cleared)
    }

    /// The bot was disconnected from voice. Queued tracks are kept.
    pub async fn voice_lost(&self, guild_id: GuildId) {
        let Some(session) = self.inner.manager.get(guild_id) else {
            return;
        };

        {
            let mut state = session.lock().await;
            if state.current.is_none() && !state.is_busy() {
                return;
            }
            warn!(
                guild_id = %guild_id,
                "🔌 Voice connection lost, keeping {} queued track(s)",
                state.queue.len()
            );
            state.reset_playback();
            state.phase = PlaybackPhase::Idle;
            state.epoch += 1;
        }

        if let Err(e) = self.inner.engine.stop(guild_id).await {
            debug!(guild_id = %guild_id, "Engine stop after voice loss: {}", e);
        }
    }

    /// Starts the queue head if the guild is idle with work queued.
    pub async fn resume_session(&self, guild_id: GuildId) {
        let session = self.session(guild_id);
        let state = session.lock().await;
        let has_work = !state.queue.is_empty() || state.loader_active();
        if has_work && state.current.is_none() && !state.is_busy() {
            session.send(SessionEvent::StartNext);
        }
    }

    /// Sets the guild volume (clamped to `0.0..=1.5`); returns the applied value.
    pub async fn set_volume(&self, guild_id: GuildId, volume: f32) -> PlayerResult<f32> {
        let volume = volume.clamp(0.0, MAX_VOLUME);
        let session = self.session(guild_id);
        let mut state = session.lock().await;
        state.volume = volume;
        if state.current.is_some() {
            self.inner.engine.set_volume(guild_id, volume).await?;
        }

        info!(guild_id = %guild_id, "🔊 Volume set to {}%", (volume * 100.0).round());
        Ok(volume)
    }

    pub async fn volume(&self, guild_id: GuildId) -> f32 {
        match self.inner.manager.get(guild_id) {
            Some(session) => session.lock().await.volume,
            None => self.inner.settings.default_volume,
        }
    }

    pub async fn status(&self, guild_id: GuildId) -> QueueStatus {
        let Some(session) = self.inner.manager.get(guild_id) else {
            return QueueStatus {
                current: None,
                position: None,
                phase: PlaybackPhase::Idle,
                queue: Vec::new(),
                pending: 0,
                loader_active: false,
                volume: self.inner.settings.default_volume,
            };
        };

        let state = session.lock().await;
        let now = Instant::now();
        let position = match (&state.current, &state.clock) {
            (Some(track), Some(clock)) => Some(clock.position(now, track.duration)),
            _ => None,
        };

        QueueStatus {
            current: state.current.clone(),
            position,
            phase: state.phase,
            queue: state.queue.snapshot(),
            pending: state.queue.pending_len(),
            loader_active: state.loader_active(),
            volume: state.volume,
        }
    }
}

/// Per-guild coordinator: the only place the queue advances.
struct PlaybackController {
    inner: Arc<PlayerInner>,
    session: Arc<GuildSession>,
}

impl PlaybackController {
    fn guild_id(&self) -> GuildId {
        self.session.guild_id()
    }

    async fn run(self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Play(track) => self.play_now(track).await,
                SessionEvent::StartNext => {
                    let idle = self.session.lock().await.current.is_none();
                    if idle {
                        self.start_next().await;
                    }
                }
                SessionEvent::TrackEnded { generation, error } => {
                    self.on_track_end(generation, error).await
                }
            }
        }
        debug!(guild_id = %self.guild_id(), "Coordinator stopped");
    }

    async fn play_now(&self, track: Track) {
        {
            let mut state = self.session.lock().await;
            if state.current.is_some() {
                let position = self.session.enqueue(&mut state, track);
                debug!(guild_id = %self.guild_id(), "Already playing, queued at {}", position);
                return;
            }
            state.phase = PlaybackPhase::Starting;
        }

        // Just resolved, no refresh needed on the first attempt.
        match self.start_track(track, false).await {
            Ok(()) => {}
            Err(PlayerError::VoiceDisconnected) => self.abort_session().await,
            Err(_) => self.start_next().await,
        }
    }

    async fn start_next(&self) {
        loop {
            if !self.inner.voice.is_connected(self.guild_id()).await {
                self.abort_session().await;
                return;
            }

            let mut state = self.session.lock().await;
            if let Some(track) = state.dequeue_front() {
                state.phase = PlaybackPhase::Starting;
                drop(state);
                match self.start_track(track, true).await {
                    Ok(()) => return,
                    Err(PlayerError::VoiceDisconnected) => {
                        self.abort_session().await;
                        return;
                    }
                    Err(_) => continue,
                }
            }

            if !state.loader_active() {
                drop(state);
                self.finish().await;
                return;
            }

            // Subscribe before releasing the lock the loader needs to append.
            state.phase = PlaybackPhase::Waiting;
            let listener = self.session.wake().subscribe();
            drop(state);
            info!(guild_id = %self.guild_id(), "⏳ Queue empty, waiting for the loader");

            let woken = listener.wait(self.inner.settings.loader_wait).await;
            if self.session.lock().await.phase != PlaybackPhase::Waiting {
                debug!(guild_id = %self.guild_id(), "Session changed while waiting");
                return;
            }
            if let Err(e) = woken {
                info!(guild_id = %self.guild_id(), "⌛ {}", e);
                self.finish().await;
                return;
            }
        }
    }

    /// Runs the start policy for one track. On final failure the track is
    /// reported and dropped; the caller moves on.
    async fn start_track(&self, track: Track, refresh_first: bool) -> PlayerResult<()> {
        let guild_id = self.guild_id();
        let track = &track;

        let result = self
            .inner
            .settings
            .start_policy
            .run(move |attempt| self.attempt_start(track, refresh_first || attempt > 1))
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(PlayerError::VoiceDisconnected) => Err(PlayerError::VoiceDisconnected),
            Err(e) => {
                error!(guild_id = %guild_id, "❌ Giving up on {}: {}", track.title, e);
                self.inner
                    .notify(
                        guild_id,
                        format!("❌ Failed to play: **{}** - Skipping...", track.title),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn attempt_start(&self, track: &Track, refresh: bool) -> PlayerResult<()> {
        let guild_id = self.guild_id();
        let mut track = track.clone();

        if refresh {
            if let Some(source) = track.source_url.clone() {
                let fresh = self.inner.resolver.resolve(&source).await?;
                track.refresh_from(fresh);
            }
        }

        if !self.inner.voice.is_connected(guild_id).await {
            return Err(PlayerError::VoiceDisconnected);
        }

        let (generation, volume) = {
            let mut state = self.session.lock().await;
            state.generation += 1;
            (state.generation, state.volume)
        };
        let request = PlayRequest {
            stream_url: track.stream_url.clone(),
            start_offset: None,
            volume,
        };
        self.inner
            .engine
            .play(guild_id, request, self.session.completion(generation))
            .await?;

        let mut state = self.session.lock().await;
        if state.phase != PlaybackPhase::Starting {
            // Stopped or disconnected while starting.
            state.suppress_completion = Some(generation);
            drop(state);
            if let Err(e) = self.inner.engine.stop(guild_id).await {
                debug!(guild_id = %guild_id, "Engine stop after cancelled start: {}", e);
            }
            return Ok(());
        }
        state.current = Some(track.clone());
        state.clock = Some(PlaybackClock::start(Instant::now()));
        state.phase = PlaybackPhase::Playing;
        drop(state);

        info!(guild_id = %guild_id, "🎵 Now playing: {}", track.title);
        self.inner
            .notify(guild_id, format!("🎵 Now playing: **{}**", track.title))
            .await;
        Ok(())
    }

    async fn on_track_end(&self, generation: u64, error: Option<String>) {
        let mut state = self.session.lock().await;
        if state.suppress_completion == Some(generation) {
            state.suppress_completion = None;
            debug!(guild_id = %self.guild_id(), "Completion suppressed");
            return;
        }
        if generation != state.generation || state.current.is_none() {
            debug!(guild_id = %self.guild_id(), "Stale completion ignored");
            return;
        }

        match &error {
            Some(e) => error!(guild_id = %self.guild_id(), "❌ Track ended with error: {}", e),
            None => debug!(guild_id = %self.guild_id(), "Track finished"),
        }
        state.reset_playback();
        state.phase = PlaybackPhase::Idle;
        drop(state);

        self.start_next().await;
    }

    async fn finish(&self) {
        {
            let mut state = self.session.lock().await;
            state.reset_playback();
            state.phase = PlaybackPhase::Finished;
        }
        info!(guild_id = %self.guild_id(), "🏁 Queue finished");
        self.inner.notify(self.guild_id(), "Queue finished.").await;
    }

    async fn abort_session(&self) {
        {
            let mut state = self.session.lock().await;
            state.reset_playback();
            state.phase = PlaybackPhase::Idle;
        }
        warn!(
            guild_id = %self.guild_id(),
            "🔌 No voice connection, playback stopped (queue kept)"
        );
        self.inner
            .notify(
                self.guild_id(),
                "⚠️ Lost the voice connection. Use /join to continue.",
            )
            .await;
    }
}
