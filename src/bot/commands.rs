use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registers the commands globally (propagation can take up to an hour).
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registers the commands for a single guild (development).
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        play_command(),
        search_command(),
        queue_command(),
        nowplaying_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        seek_command(),
        remove_command(),
        volume_command(),
        stop_command(),
        leave_command(),
        help_command(),
    ]
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song or playlist")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL or search terms")
                .required(true),
        )
}

fn search_command() -> CreateCommand {
    CreateCommand::new("search")
        .description("Search and pick one of the top results")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Search terms")
                .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the current track")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume playback")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip to the next track")
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Jump to a position in the current track")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "position",
                "e.g. 90, 1:30, 1:02:03 or 1m30s",
            )
            .required(true),
        )
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback, clear the queue and leave")
}

// Queue

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the queue")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Show the current track")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Remove tracks from the queue")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "target",
                "Position, first, last, all, or part of a title",
            )
            .required(true),
        )
}

// Audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Show or set the volume")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Volume (0-150)")
                .min_int_value(0)
                .max_int_value(150),
        )
}

// Connection

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Join your voice channel")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Leave the voice channel")
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Show the available commands")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_command_once() {
        let names: Vec<String> = all_commands()
            .iter()
            .map(|command| {
                serde_json::to_value(command).unwrap()["name"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();

        let mut unique = names.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), names.len());
        assert_eq!(names.len(), 14);
        assert!(names.contains(&"seek".to_string()));
    }
}
