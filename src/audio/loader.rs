use serenity::model::id::GuildId;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    error::{PlayerError, PlayerResult},
    manager::GuildSession,
};
use crate::sources::TrackResolver;

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

/// Counters reported when a loader exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoaderReport {
    pub processed: usize,
    pub errors: usize,
    pub cancelled: bool,
}

/// The guild's registration of its single running loader.
#[derive(Debug)]
pub struct LoaderHandle {
    id: u64,
    token: CancellationToken,
    task: JoinHandle<LoaderReport>,
}

impl LoaderHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cooperative: the loader notices at its next check.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.token.is_cancelled() || self.task.is_finished()
    }
}

/// Drains a guild's pending identifiers into its track queue.
pub struct BackgroundLoader {
    id: u64,
    guild_id: GuildId,
    session: Arc<GuildSession>,
    resolver: Arc<dyn TrackResolver>,
    token: CancellationToken,
    pace: Duration,
    report: LoaderReport,
}

impl BackgroundLoader {
    /// Starts a loader task. The caller holds the guild lock and installs the
    /// returned handle before releasing it.
    pub fn spawn(
        session: Arc<GuildSession>,
        resolver: Arc<dyn TrackResolver>,
        pace: Duration,
    ) -> LoaderHandle {
        let id = NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let loader = Self {
            id,
            guild_id: session.guild_id(),
            session,
            resolver,
            token: token.clone(),
            pace,
            report: LoaderReport::default(),
        };

        LoaderHandle {
            id,
            token,
            task: tokio::spawn(loader.run()),
        }
    }

    async fn run(mut self) -> LoaderReport {
        info!(guild_id = %self.guild_id, loader = self.id, "📥 Background loader started");

        let outcome = self.drain().await;
        if outcome.is_err() {
            // No-op when the canceller already took the handle.
            self.session.lock().await.release_loader(self.id);
        }

        match outcome {
            Ok(()) => info!(
                guild_id = %self.guild_id,
                "✅ Background loader done: {} loaded, {} failed",
                self.report.processed,
                self.report.errors
            ),
            Err(PlayerError::LoaderCancelled) => {
                self.report.cancelled = true;
                debug!(
                    guild_id = %self.guild_id,
                    "Background loader cancelled after {} loaded, {} failed",
                    self.report.processed,
                    self.report.errors
                );
            }
            Err(e) => warn!(guild_id = %self.guild_id, "⚠️ Background loader stopped: {}", e),
        }

        self.report
    }

    async fn drain(&mut self) -> PlayerResult<()> {
        loop {
            let identifier = {
                let mut state = self.session.lock().await;
                if self.token.is_cancelled() {
                    return Err(PlayerError::LoaderCancelled);
                }
                match state.queue.pop_pending() {
                    Some(identifier) => identifier,
                    None => {
                        // A waiting controller must see the loader is gone.
                        state.release_loader(self.id);
                        self.session.wake().pulse();
                        return Ok(());
                    }
                }
            };

            let resolved = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(PlayerError::LoaderCancelled),
                resolved = self.resolver.resolve(&identifier) => resolved,
            };

            match resolved {
                Ok(track) => {
                    let mut state = self.session.lock().await;
                    if self.token.is_cancelled() {
                        return Err(PlayerError::LoaderCancelled);
                    }
                    debug!(guild_id = %self.guild_id, "📥 Loaded: {}", track.title);
                    self.session.enqueue(&mut state, track);
                    self.report.processed += 1;
                }
                Err(e) => {
                    self.report.errors += 1;
                    warn!(guild_id = %self.guild_id, "⚠️ Skipping {}: {}", identifier, e);
                }
            }

            tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(PlayerError::LoaderCancelled),
                _ = tokio::time::sleep(self.pace) => {}
            }
        }
    }
}
