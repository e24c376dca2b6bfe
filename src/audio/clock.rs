//! Display-only playback position.
//!
//! The engine never reports a position back to us, so the "now playing"
//! timestamp is reconstructed from monotonic instants taken at each
//! transition. Pauses shift `started_at` forward on resume instead of
//! accumulating a separate pause total.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackClock {
    started_at: Instant,
    seek_offset: Duration,
    paused_at: Option<Instant>,
}

impl PlaybackClock {
    /// Clock for a track that started playing at `now`.
    pub fn start(now: Instant) -> Self {
        Self {
            started_at: now,
            seek_offset: Duration::ZERO,
            paused_at: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn pause(&mut self, now: Instant) {
        if !self.is_paused() {
            self.paused_at = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.started_at += now.saturating_duration_since(paused_at);
        }
    }

    /// Playback restarted at `target`; a seek always leaves the track playing.
    pub fn seek(&mut self, now: Instant, target: Duration) {
        self.started_at = now;
        self.seek_offset = target;
        self.paused_at = None;
    }

    /// Position at `now`, clamped into `[0, duration]` when the duration is known.
    pub fn position(&self, now: Instant, duration: Option<Duration>) -> Duration {
        let paused_so_far = self
            .paused_at
            .map(|paused_at| now.saturating_duration_since(paused_at))
            .unwrap_or_default();

        let elapsed = now
            .saturating_duration_since(self.started_at)
            .saturating_sub(paused_so_far);

        let position = self.seek_offset + elapsed;
        match duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn position_tracks_elapsed_time() {
        let t0 = Instant::now();
        let clock = PlaybackClock::start(t0);

        assert_eq!(clock.position(t0, None), Duration::ZERO);
        assert_eq!(clock.position(t0 + secs(42), None), secs(42));
    }

    #[test]
    fn position_is_frozen_while_paused() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::start(t0);

        clock.pause(t0 + secs(10));
        assert!(clock.is_paused());
        assert_eq!(clock.position(t0 + secs(10), None), secs(10));
        assert_eq!(clock.position(t0 + secs(70), None), secs(10));
    }

    #[test]
    fn resume_is_continuous() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::start(t0);

        clock.pause(t0 + secs(10));
        let before = clock.position(t0 + secs(25), None);
        clock.resume(t0 + secs(25));
        let after = clock.position(t0 + secs(25), None);

        assert_eq!(before, after);
        assert!(!clock.is_paused());
        assert_eq!(clock.position(t0 + secs(30), None), secs(15));
    }

    #[test]
    fn repeated_pause_keeps_first_instant() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::start(t0);

        clock.pause(t0 + secs(5));
        clock.pause(t0 + secs(9));
        clock.resume(t0 + secs(10));

        assert_eq!(clock.position(t0 + secs(10), None), secs(5));
    }

    #[test]
    fn seek_resets_offset() {
        let t0 = Instant::now();
        let mut clock = PlaybackClock::start(t0);
        clock.pause(t0 + secs(3));

        clock.seek(t0 + secs(20), secs(90));

        assert!(!clock.is_paused());
        assert_eq!(clock.position(t0 + secs(20), None), secs(90));
        assert_eq!(clock.position(t0 + secs(21), None), secs(91));
    }

    #[test]
    fn position_is_clamped_to_duration() {
        let t0 = Instant::now();
        let clock = PlaybackClock::start(t0);

        assert_eq!(clock.position(t0 + secs(500), Some(secs(180))), secs(180));
    }
}
