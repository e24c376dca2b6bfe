//! # Bot Module
//!
//! Discord front end of the jukebox: slash command registration, interaction
//! routing and voice-state tracking.
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`] and owns the pieces the
//! commands need:
//!
//! - [`AudioPlayer`], the per-guild playback core
//! - [`ChannelNotifier`], bound to the channel of each guild's last command
//! - [`JsonStorage`], where `/volume` is persisted

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod search;

use crate::{
    audio::player::AudioPlayer, config::Config, notifier::ChannelNotifier, storage::JsonStorage,
};

pub struct MusicBot {
    config: Arc<Config>,
    pub player: AudioPlayer,
    pub notifier: Arc<ChannelNotifier>,
    pub storage: Arc<tokio::sync::Mutex<JsonStorage>>,
}

impl MusicBot {
    pub fn new(
        config: Config,
        player: AudioPlayer,
        notifier: Arc<ChannelNotifier>,
        storage: Arc<tokio::sync::Mutex<JsonStorage>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            player,
            notifier,
            storage,
        }
    }

    /// Registers slash commands for the dev guild when `GUILD_ID` is set,
    /// globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registering slash commands...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        anyhow::anyhow!(
                            "Could not register guild commands (is `applications.commands` granted?): {e}"
                        )
                    })?;
                info!("✅ Guild commands registered for {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    anyhow::anyhow!("Could not register global commands: {e}")
                })?;
                info!("✅ Global commands registered");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online!", ready.user.name);
        info!("📊 Connected to {} server(s)", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ {:#}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                    error!("Error handling command: {:?}", e);
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = handlers::handle_component(&ctx, component, self).await {
                    error!("Error handling component: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Feeds the bot's own disconnects into the player so queued tracks are
    /// kept for the next `/join`.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        let was_connected = old.and_then(|state| state.channel_id).is_some();
        if was_connected && new.channel_id.is_none() {
            warn!(guild_id = %guild_id, "🔌 Bot was disconnected from voice");
            self.player.voice_lost(guild_id).await;
        }
    }
}
