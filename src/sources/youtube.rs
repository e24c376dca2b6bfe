use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{is_url, Lookup, SearchHit, TrackResolver};
use crate::audio::{
    error::{PlayerError, PlayerResult},
    queue::Track,
};

/// Format selectors tried in order until one yields a usable stream.
const FORMAT_PREFERENCES: [&str; 3] = [
    "bestaudio[ext=webm]/bestaudio[ext=m4a]/bestaudio",
    "best[height<=720]/best",
    "worst",
];

/// How many times a collection result may be followed into its first entry.
const MAX_FOLLOW_DEPTH: usize = 2;

/// Resolver backed by the `yt-dlp` binary.
pub struct YtDlpResolver {
    binary: String,
    timeout: Duration,
    max_playlist_size: usize,
    rate_limiter: Semaphore,
}

/// Subset of yt-dlp's JSON we care about.
#[derive(Debug, Default, Deserialize)]
struct YtDlpInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    ie_key: Option<String>,
    entries: Option<Vec<Option<YtDlpInfo>>>,
}

/// Outcome of reading one `--dump-single-json` document.
#[derive(Debug, PartialEq)]
enum Extracted {
    Track(Track),
    /// A collection; resolve this entry instead.
    Follow(String),
}

impl YtDlpInfo {
    fn is_collection(&self) -> bool {
        matches!(self.kind.as_deref(), Some("playlist" | "multi_video"))
            || (self.entries.is_some() && self.url.is_none())
    }

    /// Canonical page URL of a (possibly flat) entry.
    fn canonical_url(&self) -> Option<String> {
        if let Some(url) = self.webpage_url.as_ref().filter(|u| !u.is_empty()) {
            return Some(url.clone());
        }
        if let Some(url) = self.url.as_ref().filter(|u| is_url(u)) {
            return Some(url.clone());
        }
        match (self.ie_key.as_deref(), self.id.as_ref()) {
            (Some("Youtube"), Some(id)) => Some(format!("https://www.youtube.com/watch?v={id}")),
            _ => None,
        }
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    fn entry_urls(self) -> Vec<String> {
        self.entries
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.canonical_url())
            .collect()
    }

    fn extract(self, identifier: &str) -> PlayerResult<Extracted> {
        if self.is_collection() {
            let first = self
                .entries
                .unwrap_or_default()
                .into_iter()
                .flatten()
                .find_map(|entry| entry.canonical_url());
            return first
                .map(Extracted::Follow)
                .ok_or_else(|| PlayerError::NoResults(identifier.to_string()));
        }

        let stream_url = self
            .url
            .clone()
            .filter(|url| !url.is_empty() && !url.starts_with("file://"))
            .ok_or_else(|| PlayerError::resolution(identifier, "no playable stream url"))?;

        let mut track = Track::new(
            stream_url,
            self.title.clone().unwrap_or_else(|| "Unknown title".to_string()),
        );
        if let Some(duration) = self.duration() {
            track = track.with_duration(duration);
        }
        if let Some(source) = self.webpage_url.clone().or_else(|| {
            is_url(identifier).then(|| identifier.to_string())
        }) {
            track = track.with_source_url(source);
        }
        Ok(Extracted::Track(track))
    }
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, timeout: Duration, max_playlist_size: usize) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            max_playlist_size,
            // Avoid getting rate limited
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Runs yt-dlp once and parses its single JSON document.
    async fn dump_json(&self, identifier: &str, extra: &[&str]) -> PlayerResult<YtDlpInfo> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| PlayerError::resolution(identifier, e))?;

        debug!("📊 yt-dlp {:?} {}", extra, identifier);

        let mut command = Command::new(&self.binary);
        command
            .args(["--dump-single-json", "--no-warnings", "--quiet"])
            .args(extra)
            .arg("--")
            .arg(identifier)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| PlayerError::resolution(identifier, "yt-dlp timed out"))?
            .map_err(|e| PlayerError::resolution(identifier, format!("yt-dlp failed to run: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PlayerError::resolution(identifier, stderr.trim()));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| PlayerError::resolution(identifier, e))
    }

    async fn resolve_once(&self, identifier: &str) -> PlayerResult<Extracted> {
        let mut last_error = PlayerError::resolution(identifier, "no format available");
        for format in FORMAT_PREFERENCES {
            match self
                .dump_json(identifier, &["--no-playlist", "-f", format])
                .await
                .and_then(|info| info.extract(identifier))
            {
                Ok(extracted) => return Ok(extracted),
                Err(e @ PlayerError::NoResults(_)) => return Err(e),
                Err(e) => {
                    warn!("⚠️ Format `{}` failed for {}: {}", format, identifier, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

/// Plain text becomes a single-result search.
fn search_target(identifier: &str) -> String {
    let identifier = identifier.trim();
    if is_url(identifier) {
        identifier.to_string()
    } else {
        format!("ytsearch1:{identifier}")
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, identifier: &str) -> PlayerResult<Track> {
        if identifier.trim_start().starts_with("file:") {
            return Err(PlayerError::resolution(identifier, "local files are not allowed"));
        }

        let mut target = search_target(identifier);
        for _ in 0..=MAX_FOLLOW_DEPTH {
            match self.resolve_once(&target).await? {
                Extracted::Track(track) => {
                    debug!("🎵 Resolved {} -> {}", identifier, track.title);
                    return Ok(track);
                }
                Extracted::Follow(next) => target = next,
            }
        }

        Err(PlayerError::resolution(identifier, "nested collections"))
    }

    async fn expand(&self, identifier: &str) -> PlayerResult<Lookup> {
        let limit = self.max_playlist_size.to_string();
        let info = self
            .dump_json(identifier, &["--flat-playlist", "--playlist-end", &limit])
            .await?;

        if !info.is_collection() {
            let url = info.canonical_url().unwrap_or_else(|| identifier.to_string());
            return Ok(Lookup::Single(url));
        }

        let title = info.title.clone();
        let mut entries = info.entry_urls();
        entries.truncate(self.max_playlist_size);
        if entries.is_empty() {
            return Err(PlayerError::NoResults(identifier.to_string()));
        }

        info!("📋 Playlist {:?}: {} entries", title, entries.len());
        Ok(Lookup::Playlist { title, entries })
    }

    async fn search(&self, query: &str, limit: usize) -> PlayerResult<Vec<SearchHit>> {
        info!("🔍 Searching: {}", query);

        let target = format!("ytsearch{}:{}", limit.max(1), query.trim());
        let info = self.dump_json(&target, &["--flat-playlist"]).await?;

        let hits: Vec<SearchHit> = info
            .entries
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let url = entry.canonical_url()?;
                Some(SearchHit {
                    duration: entry.duration(),
                    title: entry.title.unwrap_or_else(|| url.clone()),
                    url,
                })
            })
            .take(limit)
            .collect();

        if hits.is_empty() {
            return Err(PlayerError::NoResults(query.to_string()));
        }
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(json: &str) -> YtDlpInfo {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn single_video_becomes_track() {
        let info = parse(
            r#"{"id":"abc","title":"Song","url":"https://cdn.example/audio.webm",
                "webpage_url":"https://www.youtube.com/watch?v=abc","duration":212.5}"#,
        );

        let extracted = info.extract("https://youtu.be/abc").unwrap();

        assert_eq!(
            extracted,
            Extracted::Track(
                Track::new("https://cdn.example/audio.webm", "Song")
                    .with_duration(Duration::from_secs_f64(212.5))
                    .with_source_url("https://www.youtube.com/watch?v=abc")
            )
        );
    }

    #[test]
    fn search_result_follows_first_entry() {
        let info = parse(
            r#"{"_type":"playlist","entries":[
                null,
                {"_type":"url","ie_key":"Youtube","id":"xyz","title":"Hit"}
            ]}"#,
        );

        assert_eq!(
            info.extract("ytsearch1:hit").unwrap(),
            Extracted::Follow("https://www.youtube.com/watch?v=xyz".into())
        );
    }

    #[test]
    fn empty_collection_has_no_results() {
        let info = parse(r#"{"_type":"playlist","entries":[]}"#);
        assert_eq!(
            info.extract("ytsearch1:nothing"),
            Err(PlayerError::NoResults("ytsearch1:nothing".into()))
        );
    }

    #[test]
    fn local_or_missing_stream_is_rejected() {
        let local = parse(r#"{"title":"x","url":"file:///tmp/x.webm"}"#);
        assert!(matches!(
            local.extract("id"),
            Err(PlayerError::Resolution { .. })
        ));

        let missing = parse(r#"{"title":"x"}"#);
        assert!(matches!(
            missing.extract("id"),
            Err(PlayerError::Resolution { .. })
        ));
    }

    #[test]
    fn flat_playlist_lists_canonical_urls() {
        let info = parse(
            r#"{"_type":"playlist","title":"Mix","entries":[
                {"_type":"url","url":"https://www.youtube.com/watch?v=1","title":"One"},
                {"_type":"url","ie_key":"Youtube","id":"2","title":"Two"},
                {"_type":"url","title":"broken"}
            ]}"#,
        );

        assert!(info.is_collection());
        assert_eq!(
            info.entry_urls(),
            vec![
                "https://www.youtube.com/watch?v=1".to_string(),
                "https://www.youtube.com/watch?v=2".to_string(),
            ]
        );
    }

    #[test]
    fn search_text_is_prefixed() {
        assert_eq!(search_target("  lofi beats "), "ytsearch1:lofi beats");
        assert_eq!(
            search_target("https://youtu.be/abc"),
            "https://youtu.be/abc"
        );
    }

    #[test]
    fn bogus_durations_are_dropped() {
        assert_eq!(parse(r#"{"duration":0}"#).duration(), None);
        assert_eq!(
            parse(r#"{"duration":61}"#).duration(),
            Some(Duration::from_secs(61))
        );
    }
}
