use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, model::id::GuildId, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod notifier;
mod sources;
mod storage;
mod ui;

use crate::audio::{engine::SongbirdEngine, player::AudioPlayer, voice::SongbirdVoice};
use crate::bot::MusicBot;
use crate::config::Config;
use crate::notifier::ChannelNotifier;
use crate::sources::YtDlpResolver;
use crate::storage::JsonStorage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("guild_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Guild Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    let storage = Arc::new(tokio::sync::Mutex::new(
        JsonStorage::new(config.data_dir.clone()).await?,
    ));

    // Playback core
    let songbird = Songbird::serenity();
    let notifier = Arc::new(ChannelNotifier::new(Arc::new(Http::new(&config.discord_token))));
    let player = AudioPlayer::new(
        Arc::new(YtDlpResolver::new(
            config.ytdlp_path.clone(),
            config.resolve_timeout,
            config.max_playlist_size,
        )),
        Arc::new(SongbirdEngine::new(songbird.clone())),
        Arc::new(SongbirdVoice::new(songbird.clone())),
        notifier.clone(),
        config.player_settings(),
    );

    for settings in storage.lock().await.all() {
        player
            .set_volume(GuildId::new(settings.guild_id), settings.volume)
            .await?;
    }

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = MusicBot::new(config.clone(), player, notifier, storage);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("⚠️ Shutdown signal received, closing...");
            shard_manager.shutdown_all().await;
        }
    });

    info!("🚀 Bot started");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}

/// Exits successfully when yt-dlp can be run.
async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK yt-dlp {}", String::from_utf8_lossy(&yt_dlp.stdout).trim());
        Ok(())
    } else {
        anyhow::bail!("yt-dlp at `{}` is not runnable", config.ytdlp_path);
    }
}
