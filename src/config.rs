use anyhow::Result;
use std::{path::PathBuf, time::Duration};

use crate::audio::{
    player::{PlayerSettings, MAX_VOLUME},
    retry::RetryPolicy,
};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // dev guild, commands register instantly

    // Audio
    pub default_volume: f32,
    pub max_playlist_size: usize,

    // Resolver
    pub ytdlp_path: String,
    pub resolve_timeout: Duration,

    // Playback
    pub loader_wait: Duration,
    pub loader_pace: Duration,
    pub start_attempts: u32,
    pub retry_delay: Duration,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse()?,
            max_playlist_size: std::env::var("MAX_PLAYLIST_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            // Resolver
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            resolve_timeout: Duration::from_secs(
                std::env::var("RESOLVE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "8".to_string())
                    .parse()?,
            ),

            // Playback
            loader_wait: Duration::from_secs(
                std::env::var("LOADER_WAIT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
            ),
            loader_pace: Duration::from_millis(
                std::env::var("LOADER_PACE_MS")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()?,
            ),
            start_attempts: std::env::var("START_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            retry_delay: Duration::from_millis(
                std::env::var("RETRY_DELAY_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()?,
            ),

            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 1.5
    /// - At least one start attempt and one playlist entry
    /// - The loader wait must outlast a single resolver call, otherwise a
    ///   drained queue gives up while the next track is still resolving
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_VOLUME).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and {}, got: {}",
                MAX_VOLUME,
                self.default_volume
            );
        }

        if self.start_attempts == 0 {
            anyhow::bail!("Start attempts must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.resolve_timeout.is_zero() {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.loader_wait <= self.resolve_timeout {
            anyhow::bail!(
                "Loader wait ({}) must exceed the resolve timeout ({})",
                humantime::format_duration(self.loader_wait),
                humantime::format_duration(self.resolve_timeout)
            );
        }

        Ok(())
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            start_policy: RetryPolicy {
                attempts: self.start_attempts,
                delay: self.retry_delay,
            },
            loader_wait: self.loader_wait,
            loader_pace: self.loader_pace,
            default_volume: self.default_volume,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Never includes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands in {}\n  \
            Audio: {}% vol, playlists up to {} entries\n  \
            Resolver: {} ({} timeout)\n  \
            Playback: {} attempts {} apart, loader wait {}, pace {}\n  \
            Data: {}",
            self.guild_id
                .map_or("all guilds".to_string(), |id| format!("guild {id}")),
            (self.default_volume * 100.0).round() as u32,
            self.max_playlist_size,
            self.ytdlp_path,
            humantime::format_duration(self.resolve_timeout),
            self.start_attempts,
            humantime::format_duration(self.retry_delay),
            humantime::format_duration(self.loader_wait),
            humantime::format_duration(self.loader_pace),
            self.data_dir.display()
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,

            default_volume: 1.0,
            max_playlist_size: 100,

            ytdlp_path: "yt-dlp".to_string(),
            resolve_timeout: Duration::from_secs(8),

            loader_wait: Duration::from_secs(10),
            loader_pace: Duration::from_millis(100),
            start_attempts: 3,
            retry_delay: Duration::from_secs(1),

            data_dir: "./data".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn loader_wait_must_exceed_resolve_timeout() {
        let config = Config {
            loader_wait: Duration::from_secs(8),
            ..Config::default()
        };

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("must exceed the resolve timeout"), "{err}");
    }

    #[test]
    fn rejects_out_of_range_values() {
        let loud = Config {
            default_volume: 2.0,
            ..Config::default()
        };
        assert!(loud.validate().is_err());

        let no_attempts = Config {
            start_attempts: 0,
            ..Config::default()
        };
        assert!(no_attempts.validate().is_err());
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            guild_id: Some(1234),
            ..Config::default()
        };

        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("guild 1234"));
        assert!(summary.contains("loader wait 10s"));
    }

    #[test]
    fn player_settings_follow_config() {
        let settings = Config {
            start_attempts: 5,
            retry_delay: Duration::from_millis(250),
            ..Config::default()
        }
        .player_settings();

        assert_eq!(settings.start_policy.attempts, 5);
        assert_eq!(settings.start_policy.delay, Duration::from_millis(250));
        assert_eq!(settings.loader_wait, Duration::from_secs(10));
    }
}
