use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{search, MusicBot};
use crate::{
    audio::{error::PlayerError, queue::RemoveSelector},
    ui::{
        buttons::{self, button_ids},
        embeds::{self, format_duration, volume_percent},
    },
};

/// Handles a slash command; failures become an ephemeral error reply.
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Command used outside a server"))?;

    info!(
        guild_id = %guild_id,
        "📝 /{} used by {}",
        command.data.name, command.user.name
    );

    // Playback notices follow the channel the guild last talked to us in.
    bot.notifier.bind(guild_id, command.channel_id);

    if let Err(e) = dispatch_command(ctx, &command, bot, guild_id).await {
        warn!(guild_id = %guild_id, "⚠️ /{} failed: {:#}", command.data.name, e);
        let embed = embeds::error_embed(&describe_error(&e));
        let created = command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .embed(embed.clone())
                        .ephemeral(true),
                ),
            )
            .await;
        // Already deferred: the error replaces the pending response instead.
        if created.is_err() {
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
        }
    }

    Ok(())
}

/// Handles buttons and select menus.
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Component used outside a server"))?;

    debug!(
        guild_id = %guild_id,
        "🔘 {} pressed by {}",
        component.data.custom_id, component.user.name
    );

    let custom_id = component.data.custom_id.as_str();
    let handled = if custom_id == search::TRACK_SELECTION {
        search::handle_track_selection(ctx, &component, bot).await
    } else if button_ids::is_player_control(custom_id) {
        buttons::handle_music_component(ctx, &component, bot).await
    } else {
        Err(anyhow::anyhow!("Unknown control"))
    };

    if let Err(e) = handled {
        warn!(guild_id = %guild_id, "⚠️ Component {} failed: {:#}", custom_id, e);
        let embed = embeds::error_embed(&describe_error(&e));
        let created = component
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .embed(embed.clone())
                        .ephemeral(true),
                ),
            )
            .await;
        if created.is_err() {
            component
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
        }
    }

    Ok(())
}

async fn dispatch_command(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    match command.data.name.as_str() {
        "join" => handle_join(ctx, command, bot, guild_id).await,
        "play" => handle_play(ctx, command, bot, guild_id).await,
        "search" => search::handle_search_command(ctx, command, bot).await,
        "queue" => {
            let status = bot.player.status(guild_id).await;
            reply(ctx, command, embeds::queue_embed(&status)).await
        }
        "nowplaying" => handle_nowplaying(ctx, command, bot, guild_id).await,
        "skip" => {
            let track = bot.player.skip(guild_id).await?;
            reply(ctx, command, embeds::success_embed("⏭️ Skipped", &track.title)).await
        }
        "pause" => {
            let track = bot.player.pause(guild_id).await?;
            reply(ctx, command, embeds::success_embed("⏸️ Paused", &track.title)).await
        }
        "resume" => {
            let track = bot.player.resume(guild_id).await?;
            reply(ctx, command, embeds::success_embed("▶️ Resumed", &track.title)).await
        }
        "seek" => handle_seek(ctx, command, bot, guild_id).await,
        "remove" => {
            let selector: RemoveSelector = string_option(command, "target")?.parse()?;
            let removed = bot.player.remove(guild_id, selector).await?;
            reply(ctx, command, embeds::removed_embed(&removed)).await
        }
        "volume" => handle_volume(ctx, command, bot, guild_id).await,
        "stop" => handle_stop(ctx, command, bot, guild_id).await,
        "leave" => handle_leave(ctx, command, bot, guild_id).await,
        "help" => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::help_embed())
                            .ephemeral(true),
                    ),
                )
                .await?;
            Ok(())
        }
        other => anyhow::bail!("Unknown command: {other}"),
    }
}

// Handlers

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    defer(ctx, command).await?;
    let channel_id = ensure_voice(ctx, bot, guild_id, command.user.id).await?;

    edit(
        ctx,
        command,
        embeds::success_embed("🔊 Connected", &format!("Joined <#{channel_id}>")),
    )
    .await
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = string_option(command, "query")?;

    // Resolution can take a few seconds
    defer(ctx, command).await?;
    ensure_voice(ctx, bot, guild_id, command.user.id).await?;

    let outcome = bot.player.enqueue(guild_id, query).await?;
    edit(ctx, command, embeds::enqueue_embed(&outcome)).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let status = bot.player.status(guild_id).await;
    let mut message =
        CreateInteractionResponseMessage::new().embed(embeds::now_playing_embed(&status));
    if status.current.is_some() {
        message = message.components(buttons::player_buttons(status.is_paused()));
    }

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

async fn handle_seek(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let target = parse_position(string_option(command, "position")?)?;

    defer(ctx, command).await?;
    let position = bot.player.seek(guild_id, target).await?;

    edit(
        ctx,
        command,
        embeds::success_embed("⏩ Seeked", &format!("Now at `{}`", format_duration(position))),
    )
    .await
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let level = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_i64());

    let Some(level) = level else {
        let current = bot.player.volume(guild_id).await;
        return reply(
            ctx,
            command,
            embeds::info_embed("🔊 Volume", format!("Currently at {}%", volume_percent(current))),
        )
        .await;
    };

    let applied = bot.player.set_volume(guild_id, level as f32 / 100.0).await?;
    if let Err(e) = bot.storage.lock().await.set_volume(guild_id.get(), applied).await {
        warn!(guild_id = %guild_id, "⚠️ Could not persist volume: {}", e);
    }

    reply(
        ctx,
        command,
        embeds::success_embed("🔊 Volume", &format!("Set to {}%", volume_percent(applied))),
    )
    .await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    defer(ctx, command).await?;
    let (tracks, pending) = bot.player.stop(guild_id).await?;

    edit(
        ctx,
        command,
        embeds::success_embed(
            "⏹️ Stopped",
            &format!("Cleared {tracks} queued and {pending} loading track(s)"),
        ),
    )
    .await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if bot.player.voice_channel(guild_id).await.is_none() {
        anyhow::bail!("I'm not in a voice channel");
    }

    defer(ctx, command).await?;
    bot.player.stop(guild_id).await?;

    edit(ctx, command, embeds::success_embed("👋 Left", "Disconnected from voice")).await
}

// Helpers

/// Joins the caller's voice channel unless the bot is already there.
pub(super) async fn ensure_voice(
    ctx: &Context,
    bot: &MusicBot,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId> {
    let channel_id = get_user_voice_channel(ctx, guild_id, user_id)?;

    if bot.player.voice_channel(guild_id).await != Some(channel_id) {
        bot.player.join(guild_id, channel_id).await?;
        info!(guild_id = %guild_id, "🔊 Joined voice channel {}", channel_id);
    }

    Ok(channel_id)
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Server not found in cache"))?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("You need to be in a voice channel"))
}

pub(super) fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Result<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing option `{name}`"))
}

async fn defer(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;
    Ok(())
}

async fn reply(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

static CLOCK_POSITION: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^(?:(\d+):)?(\d+):(\d{1,2})$"));

/// Parses `/seek` input: `90`, `1:30`, `1:02:03` or a humantime span like `1m30s`.
pub fn parse_position(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let invalid = || anyhow::anyhow!("Invalid position `{raw}`");

    if let Ok(seconds) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let clock = CLOCK_POSITION.as_ref().map_err(|e| e.clone())?;
    if let Some(caps) = clock.captures(raw) {
        let field = |i: usize| -> Result<u64> {
            caps.get(i)
                .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| invalid()))
        };
        let (hours, minutes, seconds) = (field(1)?, field(2)?, field(3)?);

        if seconds >= 60 || (caps.get(1).is_some() && minutes >= 60) {
            return Err(invalid());
        }
        let total = hours
            .checked_mul(3600)
            .zip(minutes.checked_mul(60))
            .and_then(|(h, m)| h.checked_add(m))
            .and_then(|hm| hm.checked_add(seconds))
            .ok_or_else(invalid)?;
        return Ok(Duration::from_secs(total));
    }

    humantime::parse_duration(raw).map_err(|_| invalid())
}

/// User-facing text for a failed command.
fn describe_error(error: &anyhow::Error) -> String {
    let Some(player_error) = error.downcast_ref::<PlayerError>() else {
        return error.to_string();
    };

    match player_error {
        PlayerError::Resolution { .. } => {
            "Couldn't load that track. Check the link or try another search.".to_string()
        }
        PlayerError::EngineStart(_) => "The stream could not be started.".to_string(),
        PlayerError::VoiceDisconnected => "I'm not connected to voice. Use /join first.".to_string(),
        PlayerError::VoiceConnect(_) => "I couldn't join your voice channel.".to_string(),
        PlayerError::Interrupted => {
            "Playback was stopped before the playlist started.".to_string()
        }
        PlayerError::NothingPlaying => "Nothing is playing right now.".to_string(),
        PlayerError::AlreadyPaused => "Playback is already paused.".to_string(),
        PlayerError::NotPaused => "Playback isn't paused.".to_string(),
        PlayerError::EmptyQueue => "The queue is empty.".to_string(),
        PlayerError::IndexOutOfRange { len } => {
            format!("Pick a position between 1 and {len}.")
        }
        PlayerError::NoMatch(text) => format!("No queued track matches \"{text}\"."),
        PlayerError::NoResults(query) => format!("No results for \"{query}\"."),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_seek_positions() {
        assert_eq!(parse_position("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_position("1:30").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_position(" 1:02:03 ").unwrap(), Duration::from_secs(3723));
        assert_eq!(parse_position("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_position("75:00").unwrap(), Duration::from_secs(4500));
    }

    #[test]
    fn rejects_bad_positions() {
        assert!(parse_position("1:75").is_err());
        assert!(parse_position("1:60:00").is_err());
        assert!(parse_position("soon").is_err());
        assert!(parse_position("").is_err());
    }

    #[test]
    fn oversized_clock_fields_are_rejected() {
        assert!(parse_position("6000000000000000:00:00").is_err());
        assert!(parse_position("400000000000000000:00").is_err());
        assert!(parse_position("99999999999999999999:00:00").is_err());
    }

    #[test]
    fn describes_player_errors() {
        let err = anyhow::Error::from(PlayerError::IndexOutOfRange { len: 3 });
        assert_eq!(describe_error(&err), "Pick a position between 1 and 3.");

        let err = anyhow::Error::from(PlayerError::resolution("x", "HTTP 403"));
        assert!(describe_error(&err).starts_with("Couldn't load that track"));

        let err = anyhow::anyhow!("You need to be in a voice channel");
        assert_eq!(describe_error(&err), "You need to be in a voice channel");
    }
}
