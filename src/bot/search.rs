use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateInteractionResponse, CreateInteractionResponseMessage,
        CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption, EditInteractionResponse,
    },
    model::application::{CommandInteraction, ComponentInteraction, ComponentInteractionDataKind},
    prelude::Context,
};
use tracing::info;

use super::{handlers, MusicBot};
use crate::{
    audio::error::PlayerError,
    sources::SearchHit,
    ui::embeds::{self, format_duration},
};

pub const TRACK_SELECTION: &str = "track_selection";

const SEARCH_LIMIT: usize = 5;

/// Discord rejects select labels longer than this.
const MAX_LABEL: usize = 100;

pub async fn handle_search_command(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let query = handlers::string_option(command, "query")?;

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    info!("🔍 Search by {}: {}", command.user.name, query);

    let hits = bot.player.search(query, SEARCH_LIMIT).await?;
    if hits.is_empty() {
        return Err(PlayerError::NoResults(query.to_string()).into());
    }

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .embed(embeds::search_results_embed(query, &hits))
                .components(vec![CreateActionRow::SelectMenu(track_selection_menu(&hits))]),
        )
        .await?;

    Ok(())
}

/// Enqueues the URL picked from the search menu.
pub async fn handle_track_selection(
    ctx: &Context,
    interaction: &ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let guild_id = interaction
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Selection made outside a server"))?;

    let ComponentInteractionDataKind::StringSelect { values } = &interaction.data.kind else {
        anyhow::bail!("Unexpected component kind for the track menu");
    };
    let url = values
        .first()
        .ok_or_else(|| anyhow::anyhow!("Nothing selected"))?;

    interaction.defer(&ctx.http).await?;

    handlers::ensure_voice(ctx, bot, guild_id, interaction.user.id).await?;

    info!("✅ {} picked {}", interaction.user.name, url);
    let outcome = bot.player.enqueue(guild_id, url).await?;

    interaction
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .embed(embeds::enqueue_embed(&outcome))
                .components(Vec::new()),
        )
        .await?;

    Ok(())
}

fn track_selection_menu(hits: &[SearchHit]) -> CreateSelectMenu {
    let options = hits
        .iter()
        .map(|hit| CreateSelectMenuOption::new(option_label(hit), hit.url.clone()))
        .collect();

    CreateSelectMenu::new(TRACK_SELECTION, CreateSelectMenuKind::String { options })
        .placeholder("Pick a track to play...")
        .min_values(1)
        .max_values(1)
}

fn option_label(hit: &SearchHit) -> String {
    let label = match hit.duration {
        Some(duration) => format!("{} [{}]", hit.title, format_duration(duration)),
        None => hit.title.clone(),
    };

    if label.chars().count() > MAX_LABEL {
        let truncated: String = label.chars().take(MAX_LABEL - 3).collect();
        format!("{truncated}...")
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn labels_carry_duration() {
        let hit = SearchHit {
            title: "Song".into(),
            url: "https://youtu.be/x".into(),
            duration: Some(Duration::from_secs(200)),
        };
        assert_eq!(option_label(&hit), "Song [3:20]");
    }

    #[test]
    fn long_labels_are_cut_on_char_boundaries() {
        let hit = SearchHit {
            title: "ñ".repeat(150),
            url: "https://youtu.be/x".into(),
            duration: None,
        };

        let label = option_label(&hit);
        assert_eq!(label.chars().count(), MAX_LABEL);
        assert!(label.ends_with("..."));
    }
}
