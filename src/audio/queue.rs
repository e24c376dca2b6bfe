use std::{collections::VecDeque, str::FromStr, time::Duration};
use tracing::{debug, info};

use super::error::{PlayerError, PlayerResult};

/// A resolved, playable unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Direct media URL handed to the audio engine. Expires after a while.
    pub stream_url: String,
    pub title: String,
    pub duration: Option<Duration>,
    /// Canonical page URL, used to refresh `stream_url` right before playback.
    pub source_url: Option<String>,
}

impl Track {
    pub fn new(stream_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            stream_url: stream_url.into(),
            title: title.into(),
            duration: None,
            source_url: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_source_url(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = Some(source_url.into());
        self
    }

    /// Copies the fresh stream URL (and any metadata we were missing) from a re-resolution.
    pub fn refresh_from(&mut self, fresh: Track) {
        self.stream_url = fresh.stream_url;
        if self.duration.is_none() {
            self.duration = fresh.duration;
        }
        if self.source_url.is_none() {
            self.source_url = fresh.source_url;
        }
    }
}

/// Target of a `remove` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveSelector {
    /// 1-based position in the main queue.
    Index(usize),
    First,
    Last,
    /// Both queues, plus the background loader.
    All,
    /// First queued track whose title contains this text (case-insensitive).
    Title(String),
}

impl FromStr for RemoveSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_lowercase();
        Ok(match lower.as_str() {
            "all" => Self::All,
            "first" => Self::First,
            "last" => Self::Last,
            _ => match trimmed.parse::<usize>() {
                Ok(index) => Self::Index(index),
                Err(_) => Self::Title(lower),
            },
        })
    }
}

/// The two per-guild FIFOs: resolved tracks and identifiers waiting for the loader.
#[derive(Debug, Default)]
pub struct TrackQueue {
    tracks: VecDeque<Track>,
    pending: VecDeque<String>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a resolved track; returns its 1-based position.
    pub fn push(&mut self, track: Track) -> usize {
        debug!("➕ Queued: {}", track.title);
        self.tracks.push_back(track);
        self.tracks.len()
    }

    pub fn pop_front(&mut self) -> Option<Track> {
        self.tracks.pop_front()
    }

    pub fn push_pending<I>(&mut self, identifiers: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        self.pending.extend(identifiers);
        self.pending.len()
    }

    pub fn push_pending_front(&mut self, identifier: String) {
        self.pending.push_front(identifier);
    }

    pub fn pop_pending(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Track> {
        self.tracks.iter().cloned().collect()
    }

    /// Drops everything; returns `(tracks, pending)` counts.
    pub fn clear(&mut self) -> (usize, usize) {
        let cleared = (self.tracks.len(), self.pending.len());
        self.tracks.clear();
        self.pending.clear();
        info!(
            "🗑️ Queue cleared: {} track(s), {} pending",
            cleared.0, cleared.1
        );
        cleared
    }

    /// Removes a single track from the main queue.
    ///
    /// `RemoveSelector::All` is handled by the caller since it also has to
    /// cancel the loader.
    pub fn remove(&mut self, selector: &RemoveSelector) -> PlayerResult<Track> {
        if self.tracks.is_empty() {
            return Err(PlayerError::EmptyQueue);
        }

        let index = match selector {
            RemoveSelector::First => 0,
            RemoveSelector::Last => self.tracks.len() - 1,
            RemoveSelector::Index(index) => {
                if *index < 1 || *index > self.tracks.len() {
                    return Err(PlayerError::IndexOutOfRange {
                        len: self.tracks.len(),
                    });
                }
                index - 1
            }
            RemoveSelector::Title(needle) => {
                let needle = needle.to_lowercase();
                self.tracks
                    .iter()
                    .position(|track| track.title.to_lowercase().contains(&needle))
                    .ok_or_else(|| PlayerError::NoMatch(needle.clone()))?
            }
            RemoveSelector::All => return Err(PlayerError::EmptyQueue),
        };

        let removed = self.tracks.remove(index).ok_or(PlayerError::EmptyQueue)?;
        debug!("❌ Removed track at position {}: {}", index + 1, removed.title);
        Ok(removed)
    }
}
