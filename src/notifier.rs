use async_trait::async_trait;
use dashmap::DashMap;
use serenity::{
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Best-effort chat notices from the playback core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, guild_id: GuildId, text: String);
}

/// Posts to the text channel where each guild last used a music command.
pub struct ChannelNotifier {
    http: Arc<Http>,
    channels: DashMap<GuildId, ChannelId>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            channels: DashMap::new(),
        }
    }

    pub fn bind(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.insert(guild_id, channel_id);
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, guild_id: GuildId, text: String) {
        let Some(channel_id) = self.channels.get(&guild_id).map(|c| *c) else {
            debug!(guild_id = %guild_id, "No text channel bound, dropping notice: {}", text);
            return;
        };

        if let Err(e) = channel_id.say(self.http.as_ref(), text).await {
            warn!(guild_id = %guild_id, "⚠️ Could not post notice: {}", e);
        }
    }
}
