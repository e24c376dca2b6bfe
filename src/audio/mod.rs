//! # Audio Module
//!
//! Per-guild playback core of the bot.
//!
//! Every guild owns an independent session: a track queue, a queue of raw
//! identifiers still waiting to be resolved, a display clock and the
//! currently playing track, all behind one async lock. Guilds never share
//! a lock, so a slow resolution or a failing stream in one server cannot
//! stall another.
//!
//! ## Architecture
//!
//! ### [`player`] - Playback controller
//! - [`player::AudioPlayer`] is the facade used by the command layer
//! - One coordinator task per guild consumes engine completions and is the
//!   only place the queue advances
//! - Retries track starts and skips tracks that keep failing
//!
//! ### [`manager`] and [`queue`] - Guild state
//! - Lazily created sessions keyed by guild
//! - FIFO track queue plus the pending-identifier queue
//!
//! ### [`loader`] - Background prefetch
//! - At most one loader per guild drains pending identifiers
//! - Wakes a waiting controller through the guild's [`signal::WakeSignal`]
//!
//! ### [`engine`] and [`voice`] - Adapters
//! - Traits the controller talks to, with songbird implementations
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let player = AudioPlayer::new(resolver, engine, voice, notifier, PlayerSettings::default());
//!
//! player.join(guild_id, channel_id).await?;
//! player.enqueue(guild_id, "https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//! player.pause(guild_id).await?;
//! player.resume(guild_id).await?;
//! player.skip(guild_id).await?;
//! ```

pub mod clock;
pub mod engine;
pub mod error;
pub mod loader;
pub mod manager;
pub mod player;
pub mod queue;
pub mod retry;
pub mod signal;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
