use thiserror::Error;

/// Failures of the per-guild playback core.
///
/// Nothing here ever crosses a guild boundary: the controller catches every
/// variant at the session level and turns it into a log line or a chat notice.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlayerError {
    /// The resolver could not produce a playable stream.
    #[error("could not resolve `{identifier}`: {reason}")]
    Resolution { identifier: String, reason: String },

    /// The audio engine refused to start the stream.
    #[error("audio engine failed to start: {0}")]
    EngineStart(String),

    /// No voice connection for the guild. Ends the current session.
    #[error("voice connection lost")]
    VoiceDisconnected,

    #[error("could not join the voice channel: {0}")]
    VoiceConnect(String),

    /// The background loader was cancelled by stop / remove all.
    #[error("background loader cancelled")]
    LoaderCancelled,

    /// The loader did not supply a track within the wait bound.
    #[error("timed out waiting for the background loader")]
    WaitTimeout,

    /// The session was stopped while a playlist was still starting.
    #[error("playback was stopped before the playlist could start")]
    Interrupted,

    #[error("nothing is playing")]
    NothingPlaying,

    #[error("playback is already paused")]
    AlreadyPaused,

    #[error("playback is not paused")]
    NotPaused,

    #[error("the queue is empty")]
    EmptyQueue,

    #[error("index must be between 1 and {len}")]
    IndexOutOfRange { len: usize },

    #[error("no queued track matches `{0}`")]
    NoMatch(String),

    #[error("no results for `{0}`")]
    NoResults(String),
}

impl PlayerError {
    pub fn resolution(identifier: impl Into<String>, reason: impl ToString) -> Self {
        Self::Resolution {
            identifier: identifier.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the start policy may try the same track again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Resolution { .. } | Self::EngineStart(_))
    }
}

pub type PlayerResult<T> = Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_resolution_and_engine_failures_are_retried() {
        assert!(PlayerError::resolution("x", "boom").is_retryable());
        assert!(PlayerError::EngineStart("403".into()).is_retryable());
        assert!(!PlayerError::VoiceDisconnected.is_retryable());
        assert!(!PlayerError::WaitTimeout.is_retryable());
    }
}
