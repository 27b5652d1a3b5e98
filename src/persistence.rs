//! Durable store for the song library, playlists, and player settings.
//!
//! Everything lives in one `data.json` document in the platform data
//! directory. Writes go through a temp file and an atomic rename.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::library::Song;
use crate::playlists::{CoverSpec, Playlist};

/// Player settings persisted alongside the stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Settings {
    /// Most-recent-first song ids, deduplicated, capped.
    #[serde(default)]
    pub recently_played: Vec<String>,
}

/// Maximum entries kept in the recently-played list.
pub const RECENTLY_PLAYED_CAP: usize = 20;

#[derive(Debug, Default, serde::Deserialize, serde::Serialize)]
struct PlaylistRecord {
    #[serde(default)]
    songs: Vec<usize>,
    #[serde(default)]
    playlist_cover: CoverSpec,
}

#[derive(Debug, Default, serde::Deserialize, serde::Serialize)]
struct DataFile {
    #[serde(rename = "All Songs", default)]
    all_songs: Vec<Song>,
    #[serde(rename = "Playlists", default)]
    playlists: BTreeMap<String, PlaylistRecord>,
    #[serde(rename = "Settings", default)]
    settings: Settings,
}

/// Load/save gateway for the durable store.
pub struct PersistenceGateway {
    data_path: PathBuf,
}

impl PersistenceGateway {
    pub fn new(data_path: PathBuf) -> Self {
        Self { data_path }
    }

    /// Default `data.json` location in the platform data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tunedock")
            .join("data.json")
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Loads songs, playlists, and settings. A missing file yields defaults
    /// and is created on the spot; an unreadable or malformed file yields
    /// defaults with a warning. Position validity is the stores' concern and
    /// is healed when they are rebuilt.
    pub fn load(&self) -> (Vec<Song>, Vec<Playlist>, Settings) {
        if !self.data_path.exists() {
            info!(
                "Data file not found. Creating default store. path={}",
                self.data_path.display()
            );
            if let Err(err) = self.save(&[], &[], &Settings::default()) {
                warn!("Failed to create default data file: {}", err);
            }
            return (Vec::new(), Vec::new(), Settings::default());
        }

        let content = match std::fs::read_to_string(&self.data_path) {
            Ok(content) => content,
            Err(err) => {
                warn!(
                    "Failed to read data file {}: {}",
                    self.data_path.display(),
                    err
                );
                return (Vec::new(), Vec::new(), Settings::default());
            }
        };

        let data = match serde_json::from_str::<DataFile>(&content) {
            Ok(data) => data,
            Err(err) => {
                warn!(
                    "Failed to parse data file {}: {}",
                    self.data_path.display(),
                    err
                );
                return (Vec::new(), Vec::new(), Settings::default());
            }
        };

        let playlists = data
            .playlists
            .into_iter()
            .map(|(name, record)| Playlist {
                name,
                positions: record.songs,
                cover: record.playlist_cover,
            })
            .collect();

        (data.all_songs, playlists, data.settings)
    }

    /// Writes the full store. Failures surface to the caller; they are
    /// reported, not retried.
    pub fn save(
        &self,
        songs: &[Song],
        playlists: &[Playlist],
        settings: &Settings,
    ) -> io::Result<()> {
        let data = DataFile {
            all_songs: songs.to_vec(),
            playlists: playlists
                .iter()
                .map(|playlist| {
                    (
                        playlist.name.clone(),
                        PlaylistRecord {
                            songs: playlist.positions.clone(),
                            playlist_cover: playlist.cover.clone(),
                        },
                    )
                })
                .collect(),
            settings: settings.clone(),
        };

        let serialized = serde_json::to_string_pretty(&data)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        if let Some(parent) = self.data_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.data_path.with_extension("json.tmp");
        std::fs::write(&temp_path, serialized)?;
        std::fs::rename(&temp_path, &self.data_path)?;
        Ok(())
    }
}

/// Pushes a song id to the front of the recently-played list, deduplicating
/// and enforcing the cap.
pub fn push_recently_played(settings: &mut Settings, id: &str) {
    settings.recently_played.retain(|value| value != id);
    settings.recently_played.insert(0, id.to_string());
    settings.recently_played.truncate(RECENTLY_PLAYED_CAP);
}
