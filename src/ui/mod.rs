//! Discord presentation: embeds and the player controls.

pub mod buttons;
pub mod embeds;
