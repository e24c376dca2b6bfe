use anyhow::Result;
use serenity::{
    all::{ButtonStyle, ComponentInteraction, Context},
    builder::{
        CreateActionRow, CreateButton, CreateInteractionResponse,
        CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
    },
};
use tracing::debug;

use super::embeds;
use crate::bot::MusicBot;

/// Custom IDs of the player controls.
pub mod button_ids {
    pub const PAUSE_RESUME: &str = "music_pause_resume";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const QUEUE: &str = "music_queue";

    pub fn is_player_control(custom_id: &str) -> bool {
        matches!(custom_id, PAUSE_RESUME | SKIP | STOP | QUEUE)
    }
}

/// Controls attached to the now-playing embed.
pub fn player_buttons(paused: bool) -> Vec<CreateActionRow> {
    let (emoji, style) = if paused {
        ('▶', ButtonStyle::Success)
    } else {
        ('⏸', ButtonStyle::Primary)
    };

    let pause_resume = CreateButton::new(button_ids::PAUSE_RESUME)
        .emoji(emoji)
        .style(style);

    let skip = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Secondary);

    let stop = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    let queue = CreateButton::new(button_ids::QUEUE)
        .label("Queue")
        .emoji('📋')
        .style(ButtonStyle::Secondary);

    vec![CreateActionRow::Buttons(vec![pause_resume, skip, stop, queue])]
}

/// Handles a click on one of the player controls.
pub async fn handle_music_component(
    ctx: &Context,
    interaction: &ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let player = &bot.player;
    let guild_id = interaction
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Button used outside a server"))?;

    match interaction.data.custom_id.as_str() {
        button_ids::PAUSE_RESUME => {
            let message = if player.status(guild_id).await.is_paused() {
                let track = player.resume(guild_id).await?;
                format!("▶️ Resumed **{}**", track.title)
            } else {
                let track = player.pause(guild_id).await?;
                format!("⏸️ Paused **{}**", track.title)
            };
            refresh_now_playing(ctx, interaction, bot, &message).await?;
        }
        button_ids::SKIP => {
            let track = player.skip(guild_id).await?;
            reply_ephemeral(ctx, interaction, &format!("⏭️ Skipped **{}**", track.title)).await?;
        }
        button_ids::STOP => {
            let (tracks, pending) = player.stop(guild_id).await?;
            reply_ephemeral(
                ctx,
                interaction,
                &format!("⏹️ Stopped and cleared {} track(s)", tracks + pending),
            )
            .await?;
        }
        button_ids::QUEUE => {
            let status = player.status(guild_id).await;
            interaction
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::queue_embed(&status))
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
        other => {
            debug!("Unhandled component: {}", other);
            reply_ephemeral(ctx, interaction, "⚠️ Unknown control").await?;
        }
    }

    Ok(())
}

async fn reply_ephemeral(
    ctx: &Context,
    interaction: &ComponentInteraction,
    content: &str,
) -> Result<()> {
    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

/// Redraws the message the buttons live on, then confirms privately.
async fn refresh_now_playing(
    ctx: &Context,
    interaction: &ComponentInteraction,
    bot: &MusicBot,
    confirmation: &str,
) -> Result<()> {
    let guild_id = interaction
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Button used outside a server"))?;
    let status = bot.player.status(guild_id).await;

    interaction
        .create_response(
            &ctx.http,
            CreateInteractionResponse::UpdateMessage(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::now_playing_embed(&status))
                    .components(player_buttons(status.is_paused())),
            ),
        )
        .await?;

    interaction
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new()
                .content(confirmation)
                .ephemeral(true),
        )
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::button_ids;

    #[test]
    fn recognizes_player_controls() {
        assert!(button_ids::is_player_control(button_ids::SKIP));
        assert!(button_ids::is_player_control("music_queue"));
        assert!(!button_ids::is_player_control("track_selection"));
    }
}
