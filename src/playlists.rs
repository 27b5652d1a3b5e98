//! Named ordered playlists addressing the library by position.

use crate::error::StoreError;
use crate::library::PositionRemap;
use std::path::PathBuf;

/// Playlist that always exists, mirrors the whole library, and can be
/// neither renamed nor deleted.
pub const PROTECTED_PLAYLIST: &str = "All songs";

/// Cover selection for one playlist: derive from member covers, or use an
/// explicit image path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(from = "String", into = "String")]
pub enum CoverSpec {
    Auto,
    Path(PathBuf),
}

impl Default for CoverSpec {
    fn default() -> Self {
        CoverSpec::Auto
    }
}

impl From<String> for CoverSpec {
    fn from(value: String) -> Self {
        if value == "auto" {
            CoverSpec::Auto
        } else {
            CoverSpec::Path(PathBuf::from(value))
        }
    }
}

impl From<CoverSpec> for String {
    fn from(value: CoverSpec) -> Self {
        match value {
            CoverSpec::Auto => "auto".to_string(),
            CoverSpec::Path(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// Named ordered subset of library positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub name: String,
    pub positions: Vec<usize>,
    pub cover: CoverSpec,
}

/// Ordered collection of uniquely named playlists.
#[derive(Debug, Default)]
pub struct PlaylistStore {
    playlists: Vec<Playlist>,
}

impl PlaylistStore {
    /// Empty store containing only the protected playlist.
    pub fn new() -> Self {
        let mut store = Self::default();
        store.ensure_protected(0);
        store
    }

    /// Rebuilds the store from restored playlists, guaranteeing the protected
    /// playlist exists and every position is in range.
    pub fn from_playlists(playlists: Vec<Playlist>, library_len: usize) -> Self {
        let mut store = Self { playlists };
        store.ensure_protected(library_len);
        store
    }

    pub fn iter(&self) -> impl Iterator<Item = &Playlist> {
        self.playlists.iter()
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|playlist| playlist.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Playlist> {
        self.playlists
            .iter_mut()
            .find(|playlist| playlist.name == name)
    }

    /// Creates a playlist under exactly the given name.
    pub fn create(
        &mut self,
        name: &str,
        positions: Vec<usize>,
        cover: CoverSpec,
    ) -> Result<(), StoreError> {
        if self.contains(name) {
            return Err(StoreError::DuplicateName);
        }
        self.playlists.push(Playlist {
            name: name.to_string(),
            positions,
            cover,
        });
        Ok(())
    }

    /// Creates a playlist, resolving a name collision by appending an
    /// incrementing ` (n)` suffix. Returns the name actually used.
    pub fn create_with_unique_name(
        &mut self,
        name: &str,
        positions: Vec<usize>,
        cover: CoverSpec,
    ) -> String {
        let mut unique_name = name.to_string();
        let mut counter = 1;
        while self.contains(&unique_name) {
            unique_name = format!("{name} ({counter})");
            counter += 1;
        }
        self.playlists.push(Playlist {
            name: unique_name.clone(),
            positions,
            cover,
        });
        unique_name
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), StoreError> {
        if old == PROTECTED_PLAYLIST {
            return Err(StoreError::ProtectedName);
        }
        if old != new && self.contains(new) {
            return Err(StoreError::DuplicateName);
        }
        let playlist = self.get_mut(old).ok_or(StoreError::NotFound)?;
        playlist.name = new.to_string();
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<(), StoreError> {
        if name == PROTECTED_PLAYLIST {
            return Err(StoreError::ProtectedName);
        }
        let index = self
            .playlists
            .iter()
            .position(|playlist| playlist.name == name)
            .ok_or(StoreError::NotFound)?;
        self.playlists.remove(index);
        Ok(())
    }

    /// Appends a position unless the playlist already contains it.
    pub fn add_song(&mut self, name: &str, position: usize) -> Result<(), StoreError> {
        let playlist = self.get_mut(name).ok_or(StoreError::NotFound)?;
        if !playlist.positions.contains(&position) {
            playlist.positions.push(position);
        }
        Ok(())
    }

    /// Removes a position; removing one that is not a member is a no-op.
    pub fn remove_song(&mut self, name: &str, position: usize) -> Result<(), StoreError> {
        let playlist = self.get_mut(name).ok_or(StoreError::NotFound)?;
        playlist.positions.retain(|value| *value != position);
        Ok(())
    }

    /// Moves `moved` into the slot currently held by `target`. Both arguments
    /// are position values; when either is not a member nothing changes.
    pub fn reorder(&mut self, name: &str, moved: usize, target: usize) -> Result<(), StoreError> {
        let playlist = self.get_mut(name).ok_or(StoreError::NotFound)?;
        let source_slot = playlist.positions.iter().position(|value| *value == moved);
        let target_slot = playlist.positions.iter().position(|value| *value == target);
        if let (Some(source_slot), Some(target_slot)) = (source_slot, target_slot) {
            let value = playlist.positions.remove(source_slot);
            playlist.positions.insert(target_slot, value);
        }
        Ok(())
    }

    /// Appends a freshly acquired position to the protected playlist.
    pub fn append_to_protected(&mut self, position: usize) {
        let _ = self.add_song(PROTECTED_PLAYLIST, position);
    }

    /// Rewrites every playlist after a library removal: dropped positions are
    /// removed and survivors shifted, uniformly from one remap.
    pub fn apply_remap(&mut self, remap: &PositionRemap) {
        if remap.is_empty() {
            return;
        }
        for playlist in &mut self.playlists {
            playlist.positions = playlist
                .positions
                .iter()
                .filter_map(|position| remap.map(*position))
                .collect();
        }
    }

    /// Guarantees the protected playlist exists (seeded with the full
    /// position range when missing) and drops any out-of-range position from
    /// every playlist.
    pub fn ensure_protected(&mut self, library_len: usize) {
        if !self.contains(PROTECTED_PLAYLIST) {
            self.playlists.insert(
                0,
                Playlist {
                    name: PROTECTED_PLAYLIST.to_string(),
                    positions: (0..library_len).collect(),
                    cover: CoverSpec::Auto,
                },
            );
        }
        for playlist in &mut self.playlists {
            playlist.positions.retain(|position| *position < library_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::Library;
    use crate::library::Song;
    use std::collections::BTreeSet;

    fn store_with(names: &[&str]) -> PlaylistStore {
        let mut store = PlaylistStore::new();
        for name in names {
            store
                .create(name, Vec::new(), CoverSpec::Auto)
                .expect("create should succeed");
        }
        store
    }

    fn song(i: usize) -> Song {
        Song {
            id: format!("s{i}"),
            title: format!("Song {i}"),
            artist: "Artist".to_string(),
            audio_path: PathBuf::from(format!("/tmp/s{i}.mp3")),
            cover_path: PathBuf::from(format!("/tmp/s{i}.png")),
            lyrics_path: PathBuf::from(format!("/tmp/s{i}.lrc")),
        }
    }

    #[test]
    fn test_create_rejects_duplicate_names() {
        let mut store = store_with(&["Favorites"]);
        let result = store.create("Favorites", Vec::new(), CoverSpec::Auto);
        assert_eq!(result, Err(StoreError::DuplicateName));
    }

    #[test]
    fn test_create_with_unique_name_appends_suffix() {
        let mut store = PlaylistStore::new();
        assert_eq!(
            store.create_with_unique_name("Favorites", vec![0], CoverSpec::Auto),
            "Favorites"
        );
        assert_eq!(
            store.create_with_unique_name("Favorites", vec![0], CoverSpec::Auto),
            "Favorites (1)"
        );
        assert_eq!(
            store.create_with_unique_name("Favorites", vec![0], CoverSpec::Auto),
            "Favorites (2)"
        );
        assert!(store.contains("Favorites (1)"));
    }

    #[test]
    fn test_rename_guards_protected_and_duplicate_names() {
        let mut store = store_with(&["Road Trip", "Gym"]);
        assert_eq!(
            store.rename(PROTECTED_PLAYLIST, "Everything"),
            Err(StoreError::ProtectedName)
        );
        assert_eq!(store.rename("Road Trip", "Gym"), Err(StoreError::DuplicateName));
        assert_eq!(store.rename("Missing", "New"), Err(StoreError::NotFound));
        assert_eq!(store.rename("Road Trip", "Road Trip"), Ok(()));
        assert_eq!(store.rename("Gym", "Lifting"), Ok(()));
        assert!(store.contains("Lifting"));
    }

    #[test]
    fn test_delete_protected_is_rejected_and_store_unchanged() {
        let mut store = store_with(&["Gym"]);
        let before = store.len();
        assert_eq!(store.delete(PROTECTED_PLAYLIST), Err(StoreError::ProtectedName));
        assert_eq!(store.len(), before);
        assert!(store.contains(PROTECTED_PLAYLIST));
    }

    #[test]
    fn test_add_song_ignores_duplicates() {
        let mut store = store_with(&["Gym"]);
        store.add_song("Gym", 3).expect("playlist should exist");
        store.add_song("Gym", 3).expect("playlist should exist");
        assert_eq!(store.get("Gym").unwrap().positions, vec![3]);
    }

    #[test]
    fn test_reorder_moves_by_value_not_slot() {
        let mut store = PlaylistStore::new();
        store
            .create("Gym", vec![10, 20, 30, 40], CoverSpec::Auto)
            .expect("create should succeed");

        store.reorder("Gym", 40, 20).expect("playlist should exist");
        assert_eq!(store.get("Gym").unwrap().positions, vec![10, 40, 20, 30]);

        // Unknown values leave the list untouched.
        store.reorder("Gym", 99, 10).expect("playlist should exist");
        assert_eq!(store.get("Gym").unwrap().positions, vec![10, 40, 20, 30]);
    }

    #[test]
    fn test_apply_remap_drops_and_shifts() {
        let mut library = Library::new();
        for i in 0..5 {
            library.append(song(i));
        }
        let mut store = PlaylistStore::new();
        store
            .create("Gym", vec![0, 2, 4], CoverSpec::Auto)
            .expect("create should succeed");

        let remap = library.remove(&BTreeSet::from([2]));
        store.apply_remap(&remap);

        assert_eq!(store.get("Gym").unwrap().positions, vec![0, 3]);
    }

    #[test]
    fn test_ensure_protected_seeds_full_range_and_filters() {
        let mut store = PlaylistStore::from_playlists(
            vec![Playlist {
                name: "Gym".to_string(),
                positions: vec![0, 7, 2],
                cover: CoverSpec::Auto,
            }],
            3,
        );
        assert_eq!(
            store.get(PROTECTED_PLAYLIST).unwrap().positions,
            vec![0, 1, 2]
        );
        assert_eq!(store.get("Gym").unwrap().positions, vec![0, 2]);

        // Shrinking the library drops the now-dangling references everywhere.
        store.ensure_protected(1);
        assert_eq!(store.get(PROTECTED_PLAYLIST).unwrap().positions, vec![0]);
        assert_eq!(store.get("Gym").unwrap().positions, vec![0]);
    }

    #[test]
    fn test_positions_stay_in_range_across_append_remove_sequences() {
        let mut library = Library::new();
        let mut store = PlaylistStore::new();
        for i in 0..8 {
            let position = library.append(song(i));
            store.append_to_protected(position);
            if position % 2 == 0 {
                let _ = store.add_song(PROTECTED_PLAYLIST, position);
            }
        }
        store
            .create("Evens", vec![0, 2, 4, 6], CoverSpec::Auto)
            .expect("create should succeed");

        for removal in [vec![1, 5], vec![0], vec![2, 3]] {
            let remap = library.remove(&removal.into_iter().collect());
            store.apply_remap(&remap);
            for playlist in store.iter() {
                for position in &playlist.positions {
                    assert!(*position < library.len());
                }
            }
        }
    }

    #[test]
    fn test_cover_spec_serde_uses_auto_keyword() {
        let auto: CoverSpec = serde_json::from_str("\"auto\"").expect("should parse");
        assert_eq!(auto, CoverSpec::Auto);
        let path: CoverSpec = serde_json::from_str("\"/tmp/c.png\"").expect("should parse");
        assert_eq!(path, CoverSpec::Path(PathBuf::from("/tmp/c.png")));
        assert_eq!(
            serde_json::to_string(&CoverSpec::Auto).expect("should serialize"),
            "\"auto\""
        );
    }
}
