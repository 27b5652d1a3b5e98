//! Sequential batch import of remote track references into one new playlist.
//!
//! References are processed strictly one at a time so progress reporting is
//! deterministic and ordered by submission. Per-item failures are collected
//! and never abort the batch.

use std::collections::VecDeque;

use log::info;

use crate::error::AcquisitionError;
use crate::library::Library;
use crate::playlists::{CoverSpec, PlaylistStore, PROTECTED_PLAYLIST};
use crate::protocol::{ImportItemStatus, ImportReport, TrackReference};

/// One per-item progress record, emitted in submission order.
pub type ItemOutcome = (usize, TrackReference, ImportItemStatus);

/// What the driver should do after feeding the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStep {
    /// Dispatch this reference to the acquisition pipeline and wait for its
    /// terminal state before advancing again.
    Dispatch {
        index: usize,
        reference: TrackReference,
    },
    /// A dispatched reference is still outstanding.
    Waiting,
    /// Every reference reached a terminal state; finalize the batch.
    Finished,
}

/// State machine for one import batch.
pub struct ImportCoordinator {
    playlist_name: String,
    pending: VecDeque<(usize, TrackReference)>,
    in_flight: Option<(usize, TrackReference)>,
    /// Playlist membership in submission order: existing and new positions.
    collected_positions: Vec<usize>,
    /// Positions that entered the library during this batch.
    newly_added: Vec<usize>,
    skipped: usize,
    failed: Vec<TrackReference>,
}

impl ImportCoordinator {
    pub fn new(playlist_name: String, references: Vec<TrackReference>) -> Self {
        Self {
            playlist_name,
            pending: references.into_iter().enumerate().collect(),
            in_flight: None,
            collected_positions: Vec::new(),
            newly_added: Vec::new(),
            skipped: 0,
            failed: Vec::new(),
        }
    }

    pub fn requested_name(&self) -> &str {
        &self.playlist_name
    }

    /// Consumes pending references until one needs the pipeline. Dedup hits
    /// are recorded as skipped outcomes along the way: first by external id,
    /// then by normalized (title, artist).
    pub fn advance(&mut self, library: &Library) -> (Vec<ItemOutcome>, ImportStep) {
        if self.in_flight.is_some() {
            return (Vec::new(), ImportStep::Waiting);
        }

        let mut outcomes = Vec::new();
        while let Some((index, reference)) = self.pending.pop_front() {
            if let Some(existing) = find_existing(library, &reference) {
                self.collected_positions.push(existing);
                self.skipped += 1;
                outcomes.push((
                    index,
                    reference,
                    ImportItemStatus::AlreadyInLibrary(existing),
                ));
                continue;
            }
            self.in_flight = Some((index, reference.clone()));
            return (outcomes, ImportStep::Dispatch { index, reference });
        }
        (outcomes, ImportStep::Finished)
    }

    /// Records the in-flight reference as downloaded at `position`.
    pub fn record_downloaded(&mut self, position: usize) -> Option<ItemOutcome> {
        let (index, reference) = self.in_flight.take()?;
        self.collected_positions.push(position);
        self.newly_added.push(position);
        Some((index, reference, ImportItemStatus::Downloaded(position)))
    }

    /// Records the in-flight reference as failed; the batch continues.
    pub fn record_failed(&mut self, error: AcquisitionError) -> Option<ItemOutcome> {
        let (index, reference) = self.in_flight.take()?;
        self.failed.push(reference.clone());
        Some((index, reference, ImportItemStatus::Failed(error)))
    }

    /// Closes the batch: with nothing collected no playlist is created;
    /// otherwise the playlist is created under a collision-free name and the
    /// newly added positions are merged into the protected playlist.
    pub fn finalize(self, playlists: &mut PlaylistStore) -> ImportReport {
        if self.collected_positions.is_empty() {
            info!(
                "Import '{}' collected no songs; not creating a playlist",
                self.playlist_name
            );
            return ImportReport {
                playlist_name: None,
                downloaded: 0,
                skipped: self.skipped,
                failed: self.failed,
            };
        }

        let name = playlists.create_with_unique_name(
            &self.playlist_name,
            self.collected_positions,
            CoverSpec::Auto,
        );
        for position in &self.newly_added {
            let _ = playlists.add_song(PROTECTED_PLAYLIST, *position);
        }
        info!(
            "Import finished: playlist '{}', {} downloaded, {} skipped, {} failed",
            name,
            self.newly_added.len(),
            self.skipped,
            self.failed.len()
        );
        ImportReport {
            playlist_name: Some(name),
            downloaded: self.newly_added.len(),
            skipped: self.skipped,
            failed: self.failed,
        }
    }
}

fn find_existing(library: &Library, reference: &TrackReference) -> Option<usize> {
    reference
        .external_id
        .as_ref()
        .and_then(|id| library.lookup_by_id(id))
        .or_else(|| library.find_by_title_artist(&reference.title, &reference.artist))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::error::AcquisitionStage;
    use crate::library::Song;

    fn song(id: &str, title: &str, artist: &str) -> Song {
        Song {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            audio_path: PathBuf::from(format!("/music/{id}.mp3")),
            cover_path: PathBuf::from(format!("/music/{id}.png")),
            lyrics_path: PathBuf::from(format!("/music/{id}.lrc")),
        }
    }

    fn reference(title: &str, artist: &str, id: Option<&str>) -> TrackReference {
        TrackReference {
            title: title.to_string(),
            artist: artist.to_string(),
            external_id: id.map(str::to_string),
            cover_url: None,
        }
    }

    fn audio_error() -> AcquisitionError {
        AcquisitionError::new(AcquisitionStage::Audio, "no stream found")
    }

    /// Drives a batch to completion, simulating the pipeline: references
    /// whose title appears in `failing_titles` fail, the rest download.
    fn run_batch(
        library: &mut Library,
        playlists: &mut PlaylistStore,
        name: &str,
        references: Vec<TrackReference>,
        failing_titles: &[&str],
    ) -> (ImportReport, Vec<ItemOutcome>) {
        let mut coordinator = ImportCoordinator::new(name.to_string(), references);
        let mut outcomes = Vec::new();
        loop {
            let (skips, step) = coordinator.advance(library);
            outcomes.extend(skips);
            match step {
                ImportStep::Dispatch { reference, .. } => {
                    if failing_titles.contains(&reference.title.as_str()) {
                        outcomes.extend(coordinator.record_failed(audio_error()));
                    } else {
                        let id = reference
                            .external_id
                            .clone()
                            .unwrap_or_else(|| format!("dl-{}", reference.title));
                        let position =
                            library.append(song(&id, &reference.title, &reference.artist));
                        outcomes.extend(coordinator.record_downloaded(position));
                    }
                }
                ImportStep::Waiting => unreachable!("driver never advances while waiting"),
                ImportStep::Finished => break,
            }
        }
        (coordinator.finalize(playlists), outcomes)
    }

    #[test]
    fn test_mixed_batch_collects_skips_downloads_and_failures() {
        let mut library = Library::new();
        library.append(song("known-1", "Old Favorite", "Artist A"));
        library.append(song("known-2", "Deep Cut", "Artist B"));
        let mut playlists = PlaylistStore::new();
        playlists.append_to_protected(0);
        playlists.append_to_protected(1);
        let all_songs_before = playlists.get(PROTECTED_PLAYLIST).unwrap().positions.len();

        let references = vec![
            reference("Old Favorite", "Artist A", Some("known-1")), // dedup by id
            reference("Broken", "Nobody", None),                    // pipeline fails
            reference("Fresh One", "Artist C", None),               // downloads
            reference("deep cut", "artist b", None),                // dedup by title/artist
            reference("Fresh Two", "Artist D", Some("ext-9")),      // downloads
        ];

        let (report, outcomes) =
            run_batch(&mut library, &mut playlists, "Mix", references, &["Broken"]);

        assert_eq!(report.playlist_name.as_deref(), Some("Mix"));
        assert_eq!(report.downloaded, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].title, "Broken");

        let playlist = playlists.get("Mix").expect("playlist should exist");
        assert_eq!(playlist.positions, vec![0, 2, 1, 3]);

        let all_songs = playlists.get(PROTECTED_PLAYLIST).unwrap();
        assert_eq!(all_songs.positions.len(), all_songs_before + 2);

        // Progress stays in submission order across all terminal states.
        let indexes: Vec<usize> = outcomes.iter().map(|(index, _, _)| *index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4]);
        assert!(matches!(
            outcomes[3].2,
            ImportItemStatus::AlreadyInLibrary(1)
        ));
    }

    #[test]
    fn test_batch_with_nothing_collected_creates_no_playlist() {
        let mut library = Library::new();
        let mut playlists = PlaylistStore::new();
        let before = playlists.len();

        let references = vec![
            reference("Broken", "Nobody", None),
            reference("Also Broken", "Nobody", None),
        ];
        let (report, _) = run_batch(
            &mut library,
            &mut playlists,
            "Doomed",
            references,
            &["Broken", "Also Broken"],
        );

        assert_eq!(report.playlist_name, None);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(playlists.len(), before);
    }

    #[test]
    fn test_name_collisions_resolve_with_numeric_suffix() {
        let mut library = Library::new();
        let mut playlists = PlaylistStore::new();

        for expected in ["Favorites", "Favorites (1)"] {
            let references = vec![reference("Song", "Artist", None)];
            let (report, _) =
                run_batch(&mut library, &mut playlists, "Favorites", references, &[]);
            assert_eq!(report.playlist_name.as_deref(), Some(expected));
        }
        assert!(playlists.contains("Favorites"));
        assert!(playlists.contains("Favorites (1)"));
    }

    #[test]
    fn test_second_reference_to_same_track_dedups_within_batch() {
        let mut library = Library::new();
        let mut playlists = PlaylistStore::new();

        let references = vec![
            reference("Echo", "Artist", None),
            reference("Echo", "Artist", None),
        ];
        let (report, _) = run_batch(&mut library, &mut playlists, "Echoes", references, &[]);

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(library.len(), 1);
        // Both slots point at the single library entry.
        assert_eq!(playlists.get("Echoes").unwrap().positions, vec![0, 0]);
    }

    #[test]
    fn test_advance_while_waiting_returns_waiting() {
        let library = Library::new();
        let mut coordinator = ImportCoordinator::new(
            "Batch".to_string(),
            vec![reference("Song", "Artist", None)],
        );
        let (_, step) = coordinator.advance(&library);
        assert!(matches!(step, ImportStep::Dispatch { .. }));
        let (outcomes, step) = coordinator.advance(&library);
        assert!(outcomes.is_empty());
        assert_eq!(step, ImportStep::Waiting);
    }
}
