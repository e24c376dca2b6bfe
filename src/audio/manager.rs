use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::debug;

use super::{
    clock::PlaybackClock,
    engine::Completion,
    loader::LoaderHandle,
    queue::{Track, TrackQueue},
    signal::WakeSignal,
};

/// Where a guild's playback session currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Starting,
    Playing,
    Paused,
    Seeking,
    /// Queue drained, waiting (bounded) for the background loader.
    Waiting,
    Finished,
}

/// Messages consumed by the guild's coordinator task.
#[derive(Debug)]
pub enum SessionEvent {
    /// Start this freshly resolved track right away.
    Play(Track),
    /// Start the queue head if nothing is active.
    StartNext,
    /// The engine finished playback attempt `generation`.
    TrackEnded {
        generation: u64,
        error: Option<String>,
    },
}

/// Everything mutable about one guild. Only reachable through the guild lock.
#[derive(Debug)]
pub struct GuildQueueState {
    pub queue: TrackQueue,
    pub current: Option<Track>,
    pub clock: Option<PlaybackClock>,
    pub phase: PlaybackPhase,
    pub volume: f32,
    /// Playback attempt counter; completions from older attempts are stale.
    pub generation: u64,
    /// Completion of this attempt must be swallowed (seek restart, stop).
    pub suppress_completion: Option<u64>,
    /// Bumped whenever the session is torn down (stop, voice loss).
    pub epoch: u64,
    loader: Option<LoaderHandle>,
}

impl GuildQueueState {
    fn new(volume: f32) -> Self {
        Self {
            queue: TrackQueue::new(),
            current: None,
            clock: None,
            phase: PlaybackPhase::Idle,
            volume,
            generation: 0,
            suppress_completion: None,
            epoch: 0,
            loader: None,
        }
    }

    /// A session is busy from the moment a start is reserved until it finishes.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.phase,
            PlaybackPhase::Starting
                | PlaybackPhase::Playing
                | PlaybackPhase::Paused
                | PlaybackPhase::Seeking
                | PlaybackPhase::Waiting
        )
    }

    pub fn loader_active(&self) -> bool {
        self.loader.as_ref().is_some_and(|loader| !loader.is_finished())
    }

    pub(crate) fn install_loader(&mut self, handle: LoaderHandle) {
        self.loader = Some(handle);
    }

    /// Called by a loader on its way out; ignored if it has been replaced.
    pub(crate) fn release_loader(&mut self, id: u64) -> bool {
        if self.loader.as_ref().is_some_and(|loader| loader.id() == id) {
            self.loader = None;
            true
        } else {
            false
        }
    }

    /// Empties both queues and cancels the loader; returns `(tracks, pending)`.
    pub fn clear_queues(&mut self) -> (usize, usize) {
        if let Some(loader) = self.loader.take() {
            loader.cancel();
        }
        self.queue.clear()
    }

    pub fn dequeue_front(&mut self) -> Option<Track> {
        self.queue.pop_front()
    }

    pub fn reset_playback(&mut self) {
        self.current = None;
        self.clock = None;
    }
}

/// Per-guild arena entry: the lock, the wake signal and the coordinator channel.
#[derive(Debug)]
pub struct GuildSession {
    guild_id: GuildId,
    state: Mutex<GuildQueueState>,
    wake: WakeSignal,
    events: mpsc::UnboundedSender<SessionEvent>,
    events_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
}

impl GuildSession {
    pub fn new(guild_id: GuildId, volume: f32) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        Self {
            guild_id,
            state: Mutex::new(GuildQueueState::new(volume)),
            wake: WakeSignal::new(),
            events,
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub async fn lock(&self) -> MutexGuard<'_, GuildQueueState> {
        self.state.lock().await
    }

    pub fn wake(&self) -> &WakeSignal {
        &self.wake
    }

    pub fn send(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!(guild_id = %self.guild_id, "Coordinator gone, event dropped");
        }
    }

    pub fn completion(&self, generation: u64) -> Completion {
        Completion::new(self.guild_id, generation, self.events.clone())
    }

    /// Hands out the event receiver once, to whoever spawns the coordinator.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.lock().take()
    }

    /// Appends a resolved track and wakes a waiting controller.
    /// `state` is this session's locked state.
    pub fn enqueue(&self, state: &mut GuildQueueState, track: Track) -> usize {
        let position = state.queue.push(track);
        self.wake.pulse();
        position
    }
}

/// Lazily creates and hands out per-guild sessions.
#[derive(Debug)]
pub struct QueueManager {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    default_volume: f32,
}

impl QueueManager {
    pub fn new(default_volume: f32) -> Self {
        Self {
            sessions: DashMap::new(),
            default_volume,
        }
    }

    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| Arc::new(GuildSession::new(guild_id, self.default_volume)))
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|session| session.clone())
    }

    /// Empties both queues and cancels the loader. The guild entry stays.
    pub async fn clear(&self, guild_id: GuildId) -> (usize, usize) {
        let Some(session) = self.get(guild_id) else {
            return (0, 0);
        };

        let cleared = session.lock().await.clear_queues();
        session.wake().pulse();
        cleared
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::loader::BackgroundLoader;
    use crate::audio::testing::FakeResolver;
    use std::time::Duration;

    fn guild() -> GuildId {
        GuildId::new(7)
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let manager = QueueManager::new(1.0);

        let first = manager.get_or_create(guild());
        let second = manager.get_or_create(guild());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.len(), 1);
        assert!(manager.get(GuildId::new(8)).is_none());
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let manager = QueueManager::new(1.0);
        let a = manager.get_or_create(GuildId::new(1));
        let b = manager.get_or_create(GuildId::new(2));

        a.enqueue(&mut *a.lock().await, Track::new("s://a", "a"));

        assert_eq!(a.lock().await.queue.len(), 1);
        assert!(b.lock().await.queue.is_empty());
    }

    #[tokio::test]
    async fn enqueue_dequeue_is_fifo() {
        let session = GuildSession::new(guild(), 1.0);
        let mut state = session.lock().await;
        for title in ["one", "two", "three"] {
            session.enqueue(&mut state, Track::new(format!("s://{title}"), title));
        }

        let mut order = Vec::new();
        while let Some(track) = state.dequeue_front() {
            order.push(track.title);
        }

        assert_eq!(order, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn events_receiver_is_handed_out_once() {
        let session = GuildSession::new(guild(), 1.0);
        assert!(session.take_events().is_some());
        assert!(session.take_events().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_loader_and_keeps_entry() {
        let manager = QueueManager::new(1.0);
        let session = manager.get_or_create(guild());
        let resolver = Arc::new(FakeResolver::new().with_delay(Duration::from_secs(5)));

        {
            let mut state = session.lock().await;
            state.queue.push(Track::new("s://a", "a"));
            state
                .queue
                .push_pending(vec!["u1".to_string(), "u2".to_string()]);
            let handle =
                BackgroundLoader::spawn(session.clone(), resolver, Duration::from_millis(100));
            state.install_loader(handle);
        }
        tokio::task::yield_now().await;

        assert_eq!(manager.clear(guild()).await, (1, 1));

        let state = session.lock().await;
        assert!(!state.loader_active());
        assert!(state.queue.is_empty());
        assert_eq!(state.queue.pending_len(), 0);
        drop(state);
        assert!(manager.get(guild()).is_some());
    }

    #[tokio::test]
    async fn clear_unknown_guild_is_noop() {
        let manager = QueueManager::new(1.0);
        assert_eq!(manager.clear(guild()).await, (0, 0));
    }
}
