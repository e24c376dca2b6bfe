use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        manager::PlaybackPhase,
        player::{EnqueueOutcome, QueueStatus, Removed},
        queue::Track,
    },
    sources::SearchHit,
};

/// Standard palette for the bot.
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

/// Rows shown by `/queue`.
const QUEUE_PAGE: usize = 10;

pub fn now_playing_embed(status: &QueueStatus) -> CreateEmbed {
    let Some(track) = &status.current else {
        return info_embed("🔇 Nothing playing", idle_description(status));
    };

    let (title, color) = if status.is_paused() {
        ("⏸️ Paused", colors::NEUTRAL_GRAY)
    } else {
        ("🎵 Now Playing", colors::MUSIC_PURPLE)
    };
    let position = status.position.unwrap_or_default();

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title))
        .color(color)
        .field("⏱️ Position", position_label(position, track.duration), true)
        .field("🔊 Volume", format!("{}%", volume_percent(status.volume)), true)
        .field("📋 Up next", upcoming_label(status), true);

    if let Some(duration) = track.duration {
        embed = embed.field("📊 Progress", progress_bar(position, duration, 20), false);
    }
    if let Some(url) = &track.source_url {
        embed = embed.url(url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn queue_embed(status: &QueueStatus) -> CreateEmbed {
    let mut description = String::new();
    if let Some(track) = &status.current {
        let marker = if status.is_paused() { "⏸️" } else { "▶️" };
        description.push_str(&format!(
            "{} **{}** `{}`\n\n",
            marker,
            track.title,
            position_label(status.position.unwrap_or_default(), track.duration)
        ));
    }

    if status.queue.is_empty() {
        description.push_str("*The queue is empty.*");
    } else {
        description.push_str(&queue_lines(&status.queue, QUEUE_PAGE));
    }

    let total: Duration = status.queue.iter().filter_map(|t| t.duration).sum();
    let mut footer = format!("{} track(s) • {}", status.queue.len(), format_duration(total));
    if status.pending > 0 {
        footer.push_str(&format!(" • ⏳ {} still loading", status.pending));
    }

    CreateEmbed::default()
        .title("📋 Queue")
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(footer))
}

/// Reply to `/play` and to a search selection.
pub fn enqueue_embed(outcome: &EnqueueOutcome) -> CreateEmbed {
    match outcome {
        EnqueueOutcome::NowPlaying { track, pending } => {
            let mut embed = success_embed("🎵 Starting playback", &track_line(track));
            if *pending > 0 {
                embed = embed.field("⏳ Loading", format!("{pending} more from the playlist"), true);
            }
            embed
        }
        EnqueueOutcome::Queued { track, position } => {
            success_embed("✅ Added to queue", &track_line(track))
                .field("📍 Position", position.to_string(), true)
        }
        EnqueueOutcome::Loading { pending } => success_embed(
            "📋 Playlist added",
            &format!("Loading **{pending}** track(s) in the background"),
        ),
    }
}

pub fn removed_embed(removed: &Removed) -> CreateEmbed {
    match removed {
        Removed::Track(track) => success_embed("🗑️ Removed", &track_line(track)),
        Removed::Cleared { tracks, pending } => success_embed(
            "🗑️ Queue cleared",
            &format!("Removed {tracks} track(s) and {pending} still loading"),
        ),
    }
}

pub fn search_results_embed(query: &str, hits: &[SearchHit]) -> CreateEmbed {
    let description = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "**{}.** {} `{}`",
                i + 1,
                hit.title,
                hit.duration.map_or("live".to_string(), format_duration)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title(format!("🔍 Results for \"{query}\""))
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new("Pick a track from the menu below"))
}

pub fn help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Guild Jukebox")
        .color(colors::MUSIC_PURPLE)
        .field(
            "▶️ Playback",
            "`/join` `/play <query or url>` `/search <query>`\n\
             `/pause` `/resume` `/skip` `/seek <position>` `/stop` `/leave`",
            false,
        )
        .field(
            "📋 Queue",
            "`/queue` `/nowplaying` `/remove <n | first | last | all | title>`",
            false,
        )
        .field("🔊 Volume", "`/volume [0-150]`", false)
        .field(
            "⏩ Seek formats",
            "`90`, `1:30`, `1:02:03` or `1m30s`",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::SUCCESS_GREEN)
}

pub fn info_embed(title: &str, description: impl Into<String>) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::INFO_BLUE)
}

pub fn error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(message)
        .color(colors::ERROR_RED)
}

fn idle_description(status: &QueueStatus) -> String {
    match status.phase {
        PlaybackPhase::Starting | PlaybackPhase::Seeking => "Starting the next track...".to_string(),
        PlaybackPhase::Waiting => "Waiting for the next track to load...".to_string(),
        _ if status.pending > 0 => format!("{} track(s) still loading", status.pending),
        _ => "Use `/play` to add something.".to_string(),
    }
}

fn upcoming_label(status: &QueueStatus) -> String {
    match (status.queue.len(), status.pending) {
        (0, 0) => "nothing".to_string(),
        (queued, 0) => format!("{queued} track(s)"),
        (queued, pending) => format!("{queued} track(s), {pending} loading"),
    }
}

fn track_line(track: &Track) -> String {
    let title = match &track.source_url {
        Some(url) => format!("[{}]({})", track.title, url),
        None => format!("**{}**", track.title),
    };
    match track.duration {
        Some(duration) => format!("{} `{}`", title, format_duration(duration)),
        None => title,
    }
}

/// Numbered list of the first `limit` tracks, with a tail count.
pub fn queue_lines(tracks: &[Track], limit: usize) -> String {
    let mut lines: Vec<String> = tracks
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, track)| {
            format!(
                "**{}.** {} `{}`",
                i + 1,
                track.title,
                track.duration.map_or("?".to_string(), format_duration)
            )
        })
        .collect();

    if tracks.len() > limit {
        lines.push(format!("*...and {} more*", tracks.len() - limit));
    }

    lines.join("\n")
}

fn position_label(position: Duration, duration: Option<Duration>) -> String {
    match duration {
        Some(duration) => format!("{} / {}", format_duration(position), format_duration(duration)),
        None => format!("{} / live", format_duration(position)),
    }
}

pub fn volume_percent(volume: f32) -> u32 {
    (volume * 100.0).round() as u32
}

pub fn progress_bar(position: Duration, duration: Duration, length: usize) -> String {
    if length == 0 {
        return String::new();
    }

    let progress = if duration.is_zero() {
        0.0
    } else {
        (position.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0)
    };
    let filled = ((progress * length as f64) as usize).min(length - 1);

    format!("{}🔘{}", "▬".repeat(filled), "▬".repeat(length - 1 - filled))
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::ZERO), "0:00");
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1:02:03");
        assert_eq!(format_duration(Duration::from_millis(59_999)), "0:59");
    }

    #[test]
    fn progress_bar_tracks_position() {
        let total = Duration::from_secs(100);
        assert_eq!(progress_bar(Duration::ZERO, total, 5), "🔘▬▬▬▬");
        assert_eq!(progress_bar(Duration::from_secs(50), total, 5), "▬▬🔘▬▬");
        assert_eq!(progress_bar(Duration::from_secs(500), total, 5), "▬▬▬▬🔘");
        assert_eq!(progress_bar(Duration::from_secs(5), Duration::ZERO, 3), "🔘▬▬");
    }

    #[test]
    fn queue_lines_truncate() {
        let tracks: Vec<Track> = (1..=4)
            .map(|i| Track::new("s", format!("song {i}")).with_duration(Duration::from_secs(61)))
            .collect();

        assert_eq!(
            queue_lines(&tracks, 2),
            "**1.** song 1 `1:01`\n**2.** song 2 `1:01`\n*...and 2 more*"
        );
    }

    #[test]
    fn volume_is_shown_as_percent() {
        assert_eq!(volume_percent(1.0), 100);
        assert_eq!(volume_percent(0.36), 36);
        assert_eq!(volume_percent(1.5), 150);
    }
}
