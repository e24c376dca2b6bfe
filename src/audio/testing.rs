//! In-memory collaborators for exercising the playback core.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashMap,
    future::Future,
    sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    time::Duration,
};

use super::{
    engine::{AudioEngine, Completion, PlayRequest},
    error::{PlayerError, PlayerResult},
    queue::Track,
    voice::VoiceSession,
};
use crate::sources::{Lookup, SearchHit, TrackResolver};

/// Resolves any identifier to a track titled after it.
#[derive(Default)]
pub struct FakeResolver {
    delay: Duration,
    duration: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    failures: parking_lot::Mutex<HashMap<String, u32>>,
    playlists: HashMap<String, Vec<String>>,
    calls: parking_lot::Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_track_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn failing(self, identifier: &str, times: u32) -> Self {
        self.fail_next(identifier, times);
        self
    }

    /// The next `times` resolutions of `identifier` fail.
    pub fn fail_next(&self, identifier: &str, times: u32) {
        self.failures.lock().insert(identifier.to_string(), times);
    }

    /// Highest number of resolutions that were ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn with_playlist(mut self, url: &str, entries: &[&str]) -> Self {
        self.playlists
            .insert(url.to_string(), entries.iter().map(|e| e.to_string()).collect());
        self
    }

    pub fn calls(&self, identifier: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == identifier).count()
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, identifier: &str) -> PlayerResult<Track> {
        self.calls.lock().push(identifier.to_string());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut failures = self.failures.lock();
        if let Some(left) = failures.get_mut(identifier).filter(|left| **left > 0) {
            *left -= 1;
            return Err(PlayerError::resolution(identifier, "stream url expired"));
        }
        drop(failures);

        let n = self.calls(identifier);
        let track = Track::new(format!("stream://{identifier}/{n}"), identifier)
            .with_source_url(identifier);
        Ok(match self.duration {
            Some(duration) => track.with_duration(duration),
            None => track,
        })
    }

    async fn expand(&self, identifier: &str) -> PlayerResult<Lookup> {
        Ok(match self.playlists.get(identifier) {
            Some(entries) => Lookup::Playlist {
                title: Some(identifier.to_string()),
                entries: entries.clone(),
            },
            None => Lookup::Single(identifier.to_string()),
        })
    }

    async fn search(&self, query: &str, limit: usize) -> PlayerResult<Vec<SearchHit>> {
        Ok((1..=limit)
            .map(|i| SearchHit {
                title: format!("{query} #{i}"),
                url: format!("https://video/{i}"),
                duration: None,
            })
            .collect())
    }
}

/// Records requests and holds each guild's pending completion.
#[derive(Default)]
pub struct FakeEngine {
    fail_next: AtomicU32,
    play_delay: parking_lot::Mutex<Duration>,
    plays: parking_lot::Mutex<Vec<PlayRequest>>,
    completions: parking_lot::Mutex<HashMap<GuildId, Completion>>,
    ops: parking_lot::Mutex<Vec<&'static str>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, times: u32) {
        self.fail_next.store(times, Ordering::SeqCst);
    }

    /// Every later `play` takes this long to open its stream.
    pub fn set_play_delay(&self, delay: Duration) {
        *self.play_delay.lock() = delay;
    }

    pub fn plays(&self) -> Vec<PlayRequest> {
        self.plays.lock().clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.ops.lock().clone()
    }

    /// Ends the guild's current track as if it ran out.
    pub fn finish_track(&self, guild_id: GuildId, error: Option<&str>) -> bool {
        let completion = self.completions.lock().remove(&guild_id);
        match completion {
            Some(completion) => {
                completion.finish(error.map(str::to_string));
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AudioEngine for FakeEngine {
    async fn play(
        &self,
        guild_id: GuildId,
        request: PlayRequest,
        completion: Completion,
    ) -> PlayerResult<()> {
        let delay = *self.play_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PlayerError::EngineStart("403 Forbidden".into()));
        }

        self.plays.lock().push(request);
        let previous = self.completions.lock().insert(guild_id, completion);
        if let Some(previous) = previous {
            previous.finish(None);
        }
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> PlayerResult<()> {
        self.ops.lock().push("stop");
        self.finish_track(guild_id, None);
        Ok(())
    }

    async fn pause(&self, _guild_id: GuildId) -> PlayerResult<()> {
        self.ops.lock().push("pause");
        Ok(())
    }

    async fn resume(&self, _guild_id: GuildId) -> PlayerResult<()> {
        self.ops.lock().push("resume");
        Ok(())
    }

    async fn set_volume(&self, _guild_id: GuildId, _volume: f32) -> PlayerResult<()> {
        self.ops.lock().push("volume");
        Ok(())
    }
}

pub struct FakeVoice {
    connected: AtomicBool,
    channel: parking_lot::Mutex<Option<ChannelId>>,
}

impl FakeVoice {
    pub fn connected() -> Self {
        Self {
            connected: AtomicBool::new(true),
            channel: parking_lot::Mutex::new(Some(ChannelId::new(100))),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl VoiceSession for FakeVoice {
    async fn connect(&self, _guild_id: GuildId, channel_id: ChannelId) -> PlayerResult<()> {
        *self.channel.lock() = Some(channel_id);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> PlayerResult<()> {
        self.connect(guild_id, channel_id).await
    }

    async fn disconnect(&self, _guild_id: GuildId) -> PlayerResult<()> {
        *self.channel.lock() = None;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self, _guild_id: GuildId) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn current_channel(&self, _guild_id: GuildId) -> Option<ChannelId> {
        *self.channel.lock()
    }
}

/// Polls `check` on the (paused) test clock until it holds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
