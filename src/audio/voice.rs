use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{error::JoinError, Songbird};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{PlayerError, PlayerResult};

/// The guild's voice connection, as far as playback cares about it.
#[async_trait]
pub trait VoiceSession: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlayerResult<()>;

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> PlayerResult<()>;

    async fn disconnect(&self, guild_id: GuildId) -> PlayerResult<()>;

    async fn is_connected(&self, guild_id: GuildId) -> bool;

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId>;
}

pub struct SongbirdVoice {
    songbird: Arc<Songbird>,
}

impl SongbirdVoice {
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self { songbird }
    }
}

#[async_trait]
impl VoiceSession for SongbirdVoice {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> PlayerResult<()> {
        self.songbird
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlayerError::VoiceConnect(e.to_string()))?;

        info!("🔊 Joined voice channel {} in guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn move_to(&self, guild_id: GuildId, channel_id: ChannelId) -> PlayerResult<()> {
        // Joining a different channel of the same guild moves the existing call.
        self.songbird
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlayerError::VoiceConnect(e.to_string()))?;

        info!("🔀 Moved to voice channel {} in guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> PlayerResult<()> {
        match self.songbird.remove(guild_id).await {
            Ok(()) => {
                info!("👋 Left voice in guild {}", guild_id);
                Ok(())
            }
            Err(JoinError::NoCall) => {
                debug!("No call to leave in guild {}", guild_id);
                Ok(())
            }
            Err(e) => Err(PlayerError::VoiceConnect(e.to_string())),
        }
    }

    async fn is_connected(&self, guild_id: GuildId) -> bool {
        match self.songbird.get(guild_id) {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.songbird.get(guild_id)?;
        let channel = call.lock().await.current_channel()?;
        Some(ChannelId::from(channel.0))
    }
}
