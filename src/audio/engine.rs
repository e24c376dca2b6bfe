use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::GuildId;
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    error::{PlayerError, PlayerResult},
    manager::SessionEvent,
};

/// What the engine needs to start one playback attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    pub stream_url: String,
    pub start_offset: Option<Duration>,
    pub volume: f32,
}

/// One-shot completion callback handed to the engine with every successful
/// `play`. It is consumed on delivery, so a track can only complete once.
#[derive(Debug)]
pub struct Completion {
    guild_id: GuildId,
    generation: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Completion {
    pub(crate) fn new(
        guild_id: GuildId,
        generation: u64,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            guild_id,
            generation,
            events,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn finish(self, error: Option<String>) {
        let event = SessionEvent::TrackEnded {
            generation: self.generation,
            error,
        };
        if self.events.send(event).is_err() {
            debug!(guild_id = %self.guild_id, "Completion dropped, session gone");
        }
    }
}

/// Streams audio into a guild's voice connection.
///
/// If `play` returns an error the completion is dropped without firing.
#[async_trait]
pub trait AudioEngine: Send + Sync {
    async fn play(
        &self,
        guild_id: GuildId,
        request: PlayRequest,
        completion: Completion,
    ) -> PlayerResult<()>;

    async fn stop(&self, guild_id: GuildId) -> PlayerResult<()>;

    async fn pause(&self, guild_id: GuildId) -> PlayerResult<()>;

    async fn resume(&self, guild_id: GuildId) -> PlayerResult<()>;

    async fn set_volume(&self, guild_id: GuildId, volume: f32) -> PlayerResult<()>;
}

/// [`AudioEngine`] on top of songbird's driver.
pub struct SongbirdEngine {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdEngine {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            songbird,
            http,
            tracks: DashMap::new(),
        }
    }

    fn with_track<F>(&self, guild_id: GuildId, op: F) -> PlayerResult<()>
    where
        F: FnOnce(&TrackHandle) -> Result<(), songbird::error::ControlError>,
    {
        let track = self
            .tracks
            .get(&guild_id)
            .ok_or(PlayerError::NothingPlaying)?;
        op(&track).map_err(|e| PlayerError::EngineStart(e.to_string()))
    }
}

#[async_trait]
impl AudioEngine for SongbirdEngine {
    async fn play(
        &self,
        guild_id: GuildId,
        request: PlayRequest,
        completion: Completion,
    ) -> PlayerResult<()> {
        let call = self
            .songbird
            .get(guild_id)
            .ok_or(PlayerError::VoiceDisconnected)?;

        // Open the stream here so an expired URL fails the attempt instead of
        // surfacing later as an immediate track end.
        let input: Input = HttpRequest::new(self.http.clone(), request.stream_url.clone()).into();
        let input = input
            .make_live_async()
            .await
            .map_err(|e| PlayerError::EngineStart(format!("{e:?}")))?;

        let handle = {
            let mut call = call.lock().await;
            if call.current_connection().is_none() {
                return Err(PlayerError::VoiceDisconnected);
            }
            call.play_input(input)
        };

        if let Err(e) = handle.set_volume(request.volume) {
            warn!(guild_id = %guild_id, "⚠️ Could not set volume: {}", e);
        }
        if let Some(offset) = request.start_offset {
            if let Err(e) = seek_outcome(handle.seek(offset).result_async().await) {
                let _ = handle.stop();
                return Err(e);
            }
        }

        let notifier = TrackEndNotifier::new(completion);
        let registered = handle
            .add_event(Event::Track(TrackEvent::End), notifier.clone())
            .and_then(|_| handle.add_event(Event::Track(TrackEvent::Error), notifier.clone()));

        if let Err(e) = registered {
            notifier.disarm();
            let _ = handle.stop();
            return Err(PlayerError::EngineStart(e.to_string()));
        }

        if let Some(previous) = self.tracks.insert(guild_id, handle) {
            let _ = previous.stop();
        }
        info!(guild_id = %guild_id, "▶️ Stream started");
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> PlayerResult<()> {
        if let Some((_, track)) = self.tracks.remove(&guild_id) {
            if let Err(e) = track.stop() {
                // Already finished: the completion has fired or is in flight.
                debug!(guild_id = %guild_id, "Stop on finished track: {}", e);
            }
        }
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> PlayerResult<()> {
        self.with_track(guild_id, |track| track.pause())
    }

    async fn resume(&self, guild_id: GuildId) -> PlayerResult<()> {
        self.with_track(guild_id, |track| track.play())
    }

    async fn set_volume(&self, guild_id: GuildId, volume: f32) -> PlayerResult<()> {
        self.with_track(guild_id, |track| track.set_volume(volume))
    }
}

/// A start offset the driver could not reach fails the attempt, since the
/// track would otherwise silently play from the beginning.
fn seek_outcome(result: Result<Duration, songbird::error::ControlError>) -> PlayerResult<Duration> {
    result.map_err(|e| PlayerError::EngineStart(format!("seek failed: {e}")))
}

/// Shared by the End and Error registrations; whichever fires first delivers.
#[derive(Clone)]
struct TrackEndNotifier {
    completion: Arc<parking_lot::Mutex<Option<Completion>>>,
}

impl TrackEndNotifier {
    fn new(completion: Completion) -> Self {
        Self {
            completion: Arc::new(parking_lot::Mutex::new(Some(completion))),
        }
    }

    fn disarm(&self) {
        self.completion.lock().take();
    }
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{e:?}")),
                _ => None,
            }),
            _ => None,
        };

        if let Some(error) = &error {
            warn!("⚠️ Track errored: {}", error);
        }

        let completion = self.completion.lock().take();
        if let Some(completion) = completion {
            debug!(generation = completion.generation(), "Track ended");
            completion.finish(error);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use songbird::error::ControlError;

    #[test]
    fn unreachable_start_offset_fails_the_attempt() {
        assert_eq!(
            seek_outcome(Ok(Duration::from_secs(90))),
            Ok(Duration::from_secs(90))
        );

        for error in [ControlError::Finished, ControlError::Dropped] {
            let outcome = seek_outcome(Err(error));
            assert!(matches!(outcome, Err(PlayerError::EngineStart(_))), "{outcome:?}");
        }
    }
}
