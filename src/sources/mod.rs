pub mod youtube;

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::audio::{error::PlayerResult, queue::Track};

pub use youtube::YtDlpResolver;

/// What a URL turned out to point at, before anything is resolved to a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Single(String),
    Playlist {
        title: Option<String>,
        entries: Vec<String>,
    },
}

/// One row of a search result list.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
}

/// Turns URLs and search text into playable tracks.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resolves one identifier (URL or search text) to a fresh stream.
    async fn resolve(&self, identifier: &str) -> PlayerResult<Track>;

    /// Flat lookup: playlist entries are listed, not resolved.
    async fn expand(&self, identifier: &str) -> PlayerResult<Lookup>;

    async fn search(&self, query: &str, limit: usize) -> PlayerResult<Vec<SearchHit>>;
}

/// Whether the user typed a link rather than search text.
pub fn is_url(raw: &str) -> bool {
    match Url::parse(raw.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}
