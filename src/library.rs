//! Canonical song library: position-addressed records plus the id index.
//!
//! Every playlist addresses songs by their position in this collection, so
//! removal is an atomic pass that yields one remap for all of them.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use log::warn;

/// One acquired track's metadata plus its local artifact paths.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Song {
    pub id: String,
    #[serde(rename = "song_name")]
    pub title: String,
    pub artist: String,
    #[serde(rename = "mp3_location")]
    pub audio_path: PathBuf,
    #[serde(rename = "cover_location")]
    pub cover_path: PathBuf,
    #[serde(rename = "lyrics_location")]
    pub lyrics_path: PathBuf,
}

/// Outcome of one removal pass, mapping old positions to their new values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRemap {
    removed: BTreeSet<usize>,
}

impl PositionRemap {
    /// Rebuilds a remap from the removed positions carried in a
    /// removal notification.
    pub fn from_removed(removed: impl IntoIterator<Item = usize>) -> Self {
        Self {
            removed: removed.into_iter().collect(),
        }
    }

    /// New position for `old`, or `None` when the song at `old` was removed.
    ///
    /// Survivors shift down by the number of removed positions strictly below
    /// them.
    pub fn map(&self, old: usize) -> Option<usize> {
        if self.removed.contains(&old) {
            return None;
        }
        Some(old - self.removed.range(..old).count())
    }

    /// Removed positions in ascending order.
    pub fn removed_positions(&self) -> Vec<usize> {
        self.removed.iter().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Canonical ordered collection of songs with an id lookup index.
#[derive(Debug, Default)]
pub struct Library {
    songs: Vec<Song>,
    id_index: HashMap<String, usize>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the library from restored records; on duplicate ids the later
    /// record wins the index slot.
    pub fn from_songs(songs: Vec<Song>) -> Self {
        let mut library = Self {
            songs,
            id_index: HashMap::new(),
        };
        library.rebuild_index();
        library
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&Song> {
        self.songs.get(position)
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    /// Appends a song and returns its position.
    pub fn append(&mut self, song: Song) -> usize {
        let position = self.songs.len();
        self.id_index.insert(song.id.clone(), position);
        self.songs.push(song);
        position
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<usize> {
        self.id_index.get(id).copied()
    }

    /// Position of the first song matching the normalized (title, artist)
    /// pair; the dedup fallback when no stable id is available.
    pub fn find_by_title_artist(&self, title: &str, artist: &str) -> Option<usize> {
        let title = normalize(title);
        let artist = normalize(artist);
        self.songs
            .iter()
            .position(|song| normalize(&song.title) == title && normalize(&song.artist) == artist)
    }

    /// Removes the songs at the given positions in one pass and returns the
    /// remap every playlist must be rewritten with. Out-of-range positions
    /// are ignored. The id index is rebuilt from scratch because all
    /// surviving positions may shift.
    pub fn remove(&mut self, positions: &BTreeSet<usize>) -> PositionRemap {
        let removed: BTreeSet<usize> = positions
            .iter()
            .copied()
            .filter(|position| *position < self.songs.len())
            .collect();

        for position in removed.iter().rev() {
            self.songs.remove(*position);
        }
        self.rebuild_index();

        PositionRemap { removed }
    }

    fn rebuild_index(&mut self) {
        self.id_index.clear();
        for (position, song) in self.songs.iter().enumerate() {
            self.id_index.insert(song.id.clone(), position);
        }
    }
}

/// Deletes a removed song's on-disk artifacts. Failures are logged and never
/// interrupt the removal pass.
pub fn delete_artifacts(song: &Song) {
    for path in [&song.audio_path, &song.cover_path, &song.lyrics_path] {
        if path.as_os_str().is_empty() {
            continue;
        }
        if let Err(err) = std::fs::remove_file(path) {
            warn!(
                "Failed to delete artifact {} for '{}': {}",
                path.display(),
                song.title,
                err
            );
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
