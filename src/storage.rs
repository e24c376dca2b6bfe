use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info, warn};

/// Per-guild settings that survive restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: u64,
    pub volume: f32,
    pub updated_at: DateTime<Utc>,
}

/// JSON file store, one file per guild under `<data_dir>/guilds`.
pub struct JsonStorage {
    data_dir: PathBuf,
    guilds: HashMap<u64, GuildSettings>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(data_dir.join("guilds")).await?;

        info!("📁 Storage initialized at: {}", data_dir.display());

        let mut storage = Self {
            data_dir,
            guilds: HashMap::new(),
        };
        storage.load_all().await?;

        Ok(storage)
    }

    pub fn all(&self) -> impl Iterator<Item = &GuildSettings> {
        self.guilds.values()
    }

    /// Records the guild volume and writes it to disk.
    pub async fn set_volume(&mut self, guild_id: u64, volume: f32) -> Result<GuildSettings> {
        let settings = GuildSettings {
            guild_id,
            volume,
            updated_at: Utc::now(),
        };

        self.save(&settings).await?;
        self.guilds.insert(guild_id, settings.clone());

        debug!("💾 Saved settings for guild {}", guild_id);
        Ok(settings)
    }

    async fn save(&self, settings: &GuildSettings) -> Result<()> {
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(self.guild_file(settings.guild_id), content).await?;
        Ok(())
    }

    async fn load(&self, guild_id: u64) -> Result<GuildSettings> {
        let content = fs::read_to_string(self.guild_file(guild_id)).await?;
        Ok(serde_json::from_str(&content)?)
    }

    async fn load_all(&mut self) -> Result<()> {
        let mut files = fs::read_dir(self.data_dir.join("guilds")).await?;
        let mut loaded = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            let Some(guild_id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            else {
                continue;
            };

            match self.load(guild_id).await {
                Ok(settings) => {
                    self.guilds.insert(guild_id, settings);
                    loaded += 1;
                }
                Err(e) => warn!("⚠️ Skipping settings for guild {}: {}", guild_id, e),
            }
        }

        if loaded > 0 {
            info!("📂 Loaded settings for {} guild(s)", loaded);
        }

        Ok(())
    }

    fn guild_file(&self, guild_id: u64) -> PathBuf {
        self.data_dir.join("guilds").join(format!("{guild_id}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn volume_survives_reload() {
        let dir = tempfile::tempdir().unwrap();

        let saved = {
            let mut storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
            storage.set_volume(42, 0.75).await.unwrap()
        };

        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        let loaded: Vec<&GuildSettings> = storage.all().collect();
        assert_eq!(loaded, vec![&saved]);
    }

    #[tokio::test]
    async fn ignores_unrelated_and_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let guilds = dir.path().join("guilds");
        std::fs::create_dir_all(&guilds).unwrap();
        std::fs::write(guilds.join("notes.txt"), "hello").unwrap();
        std::fs::write(guilds.join("7.json"), "{ not json").unwrap();

        let storage = JsonStorage::new(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(storage.all().count(), 0);
    }
}
