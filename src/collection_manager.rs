//! Manager owning the song library and playlist store.
//!
//! Every mutation of the two stores happens on this manager's thread;
//! acquisition workers only ever hand back immutable results over the bus.
//! The import coordinator is driven from here so that exactly one reference
//! is in flight at a time.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

use log::{debug, error, info, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};
use uuid::Uuid;

use crate::{
    import::{ImportCoordinator, ImportStep},
    library::{self, Library},
    persistence::{self, PersistenceGateway, Settings},
    playlists::{CoverSpec, PlaylistStore},
    protocol::{
        AcquisitionMessage, ImportMessage, LibraryMessage, Message, PlaybackMessage,
        PlaylistMessage, PlaylistSummary, QueueEntry,
    },
};

pub struct CollectionManager {
    library: Library,
    playlists: PlaylistStore,
    settings: Settings,
    gateway: PersistenceGateway,
    /// Derived cover sources per playlist name.
    cover_cache: HashMap<String, Vec<PathBuf>>,
    import: Option<ImportCoordinator>,
    /// Job ticket of the import reference currently in flight.
    import_job: Option<String>,
    /// Job tickets of single-track downloads in flight.
    single_jobs: HashSet<String>,
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
}

impl CollectionManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        gateway: PersistenceGateway,
    ) -> Self {
        Self {
            library: Library::new(),
            playlists: PlaylistStore::new(),
            settings: Settings::default(),
            gateway,
            cover_cache: HashMap::new(),
            import: None,
            import_job: None,
            single_jobs: HashSet::new(),
            bus_consumer,
            bus_producer,
        }
    }

    pub fn run(&mut self) {
        let (songs, playlists, settings) = self.gateway.load();
        info!(
            "Restoring library: {} songs, {} playlists",
            songs.len(),
            playlists.len()
        );
        self.library = Library::from_songs(songs);
        self.playlists = PlaylistStore::from_playlists(playlists, self.library.len());
        self.settings = settings;

        let _ = self.bus_producer.send(Message::Library(
            LibraryMessage::LibraryRestored(self.library.songs().to_vec()),
        ));
        self.broadcast_playlists_changed();

        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("CollectionManager lagged, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Playlist(message) => self.handle_playlist_message(message),
            Message::Library(LibraryMessage::DeleteSongs(positions)) => {
                self.delete_songs(positions);
            }
            Message::Library(LibraryMessage::DownloadTrack(reference)) => {
                self.download_single_track(reference);
            }
            Message::Import(ImportMessage::Start {
                playlist_name,
                references,
            }) => {
                self.start_import(playlist_name, references);
            }
            Message::Acquisition(AcquisitionMessage::Completed { job, song }) => {
                self.on_acquisition_completed(job, song);
            }
            Message::Acquisition(AcquisitionMessage::Failed { job, error, .. }) => {
                self.on_acquisition_failed(job, error);
            }
            Message::Playback(PlaybackMessage::TrackStarted { position }) => {
                self.on_track_started(position);
            }
            _ => {}
        }
    }

    fn handle_playlist_message(&mut self, message: PlaylistMessage) {
        match message {
            PlaylistMessage::Create {
                name,
                positions,
                cover,
            } => match self.playlists.create(&name, positions, cover) {
                Ok(()) => {
                    debug!("Created playlist '{}'", name);
                    self.after_playlist_mutation(&name);
                }
                Err(reason) => self.reject("create", reason),
            },
            PlaylistMessage::Rename { old, new } => match self.playlists.rename(&old, &new) {
                Ok(()) => {
                    self.cover_cache.remove(&old);
                    self.after_playlist_mutation(&new);
                }
                Err(reason) => self.reject("rename", reason),
            },
            PlaylistMessage::Delete(name) => match self.playlists.delete(&name) {
                Ok(()) => {
                    debug!("Deleted playlist '{}'", name);
                    self.after_playlist_mutation(&name);
                }
                Err(reason) => self.reject("delete", reason),
            },
            PlaylistMessage::AddSong { name, position } => {
                match self.playlists.add_song(&name, position) {
                    Ok(()) => self.after_playlist_mutation(&name),
                    Err(reason) => self.reject("add song", reason),
                }
            }
            PlaylistMessage::RemoveSong { name, position } => {
                match self.playlists.remove_song(&name, position) {
                    Ok(()) => self.after_playlist_mutation(&name),
                    Err(reason) => self.reject("remove song", reason),
                }
            }
            PlaylistMessage::Reorder {
                name,
                moved,
                target,
            } => match self.playlists.reorder(&name, moved, target) {
                Ok(()) => self.after_playlist_mutation(&name),
                Err(reason) => self.reject("reorder", reason),
            },
            PlaylistMessage::PlayPlaylist(name) => {
                let entries = self.queue_entries(&name);
                if !entries.is_empty() {
                    let _ = self.bus_producer.send(Message::Playback(
                        PlaybackMessage::LoadQueue {
                            entries,
                            start_index: 0,
                        },
                    ));
                }
            }
            PlaylistMessage::PlayFromPlaylist { name, position } => {
                self.play_from_playlist(&name, position);
            }
            PlaylistMessage::QueuePlaylist(name) => {
                let entries = self.queue_entries(&name);
                if !entries.is_empty() {
                    let _ = self
                        .bus_producer
                        .send(Message::Playback(PlaybackMessage::AppendMany(entries)));
                }
            }
            PlaylistMessage::RequestCover(name) => {
                let sources = self.resolve_cover_sources(&name);
                let _ = self.bus_producer.send(Message::Playlist(
                    PlaylistMessage::CoverResolved { name, sources },
                ));
            }
            _ => {}
        }
    }

    /// Builds the playback snapshot for one playlist: each member position
    /// paired with its audio path at this moment.
    fn queue_entries(&self, name: &str) -> Vec<QueueEntry> {
        let Some(playlist) = self.playlists.get(name) else {
            return Vec::new();
        };
        playlist
            .positions
            .iter()
            .filter_map(|position| {
                self.library.get(*position).map(|song| QueueEntry {
                    position: *position,
                    path: song.audio_path.clone(),
                })
            })
            .collect()
    }

    fn play_from_playlist(&mut self, name: &str, position: usize) {
        let entries = self.queue_entries(name);
        let start_index = entries
            .iter()
            .position(|entry| entry.position == position);
        let (entries, start_index) = match start_index {
            Some(start_index) => (entries, start_index),
            // The picked song is not a member; play it alone.
            None => match self.library.get(position) {
                Some(song) => (
                    vec![QueueEntry {
                        position,
                        path: song.audio_path.clone(),
                    }],
                    0,
                ),
                None => return,
            },
        };
        let _ = self
            .bus_producer
            .send(Message::Playback(PlaybackMessage::LoadQueue {
                entries,
                start_index,
            }));
    }

    /// One atomic removal pass: songs leave the library, every playlist is
    /// rewritten from the same remap, artifacts are deleted, and the result
    /// is persisted.
    fn delete_songs(&mut self, positions: Vec<usize>) {
        let positions: BTreeSet<usize> = positions.into_iter().collect();
        if positions.is_empty() {
            return;
        }

        let doomed: Vec<_> = positions
            .iter()
            .filter_map(|position| self.library.get(*position).cloned())
            .collect();
        let remap = self.library.remove(&positions);
        if remap.is_empty() {
            return;
        }
        self.playlists.apply_remap(&remap);
        for song in &doomed {
            library::delete_artifacts(song);
        }

        info!("Deleted {} songs from the library", doomed.len());
        self.cover_cache.clear();
        self.persist();
        let _ = self
            .bus_producer
            .send(Message::Library(LibraryMessage::SongsRemoved {
                removed: remap.removed_positions(),
            }));
        self.broadcast_playlists_changed();
    }

    fn download_single_track(&mut self, reference: crate::protocol::TrackReference) {
        if let Some(id) = reference.external_id.as_deref() {
            if self.library.lookup_by_id(id).is_some() {
                info!("'{}' is already in the library", reference.title);
                return;
            }
        }
        if self
            .library
            .find_by_title_artist(&reference.title, &reference.artist)
            .is_some()
        {
            info!("'{}' is already in the library", reference.title);
            return;
        }

        let job = Uuid::new_v4().to_string();
        self.single_jobs.insert(job.clone());
        let _ = self
            .bus_producer
            .send(Message::Acquisition(AcquisitionMessage::Fetch {
                job,
                reference,
            }));
    }

    fn start_import(&mut self, playlist_name: String, references: Vec<crate::protocol::TrackReference>) {
        if self.import.is_some() {
            warn!("Rejecting import '{}': another import is running", playlist_name);
            let _ = self
                .bus_producer
                .send(Message::Import(ImportMessage::Rejected(playlist_name)));
            return;
        }
        info!(
            "Starting import '{}' with {} references",
            playlist_name,
            references.len()
        );
        self.import = Some(ImportCoordinator::new(playlist_name, references));
        self.continue_import();
    }

    /// Advances the import until it either dispatches one reference to the
    /// pipeline or finishes.
    fn continue_import(&mut self) {
        let Some(mut coordinator) = self.import.take() else {
            return;
        };

        let (outcomes, step) = coordinator.advance(&self.library);
        for (index, reference, status) in outcomes {
            let _ = self
                .bus_producer
                .send(Message::Import(ImportMessage::ItemFinished {
                    index,
                    reference,
                    status,
                }));
        }

        match step {
            ImportStep::Dispatch { index, reference } => {
                debug!(
                    "Import: dispatching item {} '{}' by '{}'",
                    index, reference.title, reference.artist
                );
                let job = Uuid::new_v4().to_string();
                self.import_job = Some(job.clone());
                self.import = Some(coordinator);
                let _ = self
                    .bus_producer
                    .send(Message::Acquisition(AcquisitionMessage::Fetch {
                        job,
                        reference,
                    }));
            }
            ImportStep::Waiting => {
                self.import = Some(coordinator);
            }
            ImportStep::Finished => {
                let report = coordinator.finalize(&mut self.playlists);
                self.import_job = None;
                if let Some(name) = &report.playlist_name {
                    self.cover_cache.remove(name);
                }
                self.persist();
                let _ = self
                    .bus_producer
                    .send(Message::Import(ImportMessage::Completed(report)));
                self.broadcast_playlists_changed();
            }
        }
    }

    fn on_acquisition_completed(&mut self, job: String, song: crate::library::Song) {
        if self.import_job.as_deref() == Some(job.as_str()) {
            let position = self.library.append(song.clone());
            self.playlists.append_to_protected(position);
            let _ = self
                .bus_producer
                .send(Message::Library(LibraryMessage::SongAdded {
                    position,
                    song,
                }));
            if let Some(coordinator) = self.import.as_mut() {
                if let Some((index, reference, status)) = coordinator.record_downloaded(position) {
                    let _ = self
                        .bus_producer
                        .send(Message::Import(ImportMessage::ItemFinished {
                            index,
                            reference,
                            status,
                        }));
                }
            }
            self.import_job = None;
            self.continue_import();
        } else if self.single_jobs.remove(&job) {
            let position = self.library.append(song.clone());
            self.playlists.append_to_protected(position);
            self.cover_cache.clear();
            self.persist();
            let _ = self
                .bus_producer
                .send(Message::Library(LibraryMessage::SongAdded {
                    position,
                    song,
                }));
            self.broadcast_playlists_changed();
        }
    }

    fn on_acquisition_failed(&mut self, job: String, error: crate::error::AcquisitionError) {
        if self.import_job.as_deref() == Some(job.as_str()) {
            if let Some(coordinator) = self.import.as_mut() {
                if let Some((index, reference, status)) = coordinator.record_failed(error) {
                    let _ = self
                        .bus_producer
                        .send(Message::Import(ImportMessage::ItemFinished {
                            index,
                            reference,
                            status,
                        }));
                }
            }
            self.import_job = None;
            self.continue_import();
        } else {
            self.single_jobs.remove(&job);
        }
    }

    fn on_track_started(&mut self, position: usize) {
        let Some(song) = self.library.get(position) else {
            return;
        };
        let id = song.id.clone();
        persistence::push_recently_played(&mut self.settings, &id);
        self.persist();
        let _ = self
            .bus_producer
            .send(Message::Library(LibraryMessage::RecentlyPlayedChanged(
                self.settings.recently_played.clone(),
            )));
    }

    /// Derived cover sources for a playlist: the explicit cover when set and
    /// readable, else up to four member covers that exist on disk.
    fn resolve_cover_sources(&mut self, name: &str) -> Vec<PathBuf> {
        if let Some(cached) = self.cover_cache.get(name) {
            return cached.clone();
        }
        let Some(playlist) = self.playlists.get(name) else {
            return Vec::new();
        };
        let sources = match &playlist.cover {
            CoverSpec::Path(path) if path.exists() => vec![path.clone()],
            _ => playlist
                .positions
                .iter()
                .filter_map(|position| self.library.get(*position))
                .map(|song| song.cover_path.clone())
                .filter(|path| path.exists())
                .take(4)
                .collect(),
        };
        self.cover_cache.insert(name.to_string(), sources.clone());
        sources
    }

    fn after_playlist_mutation(&mut self, name: &str) {
        self.cover_cache.remove(name);
        self.persist();
        self.broadcast_playlists_changed();
    }

    fn reject(&self, action: &str, reason: crate::error::StoreError) {
        warn!("Playlist {} rejected: {}", action, reason);
        let _ = self
            .bus_producer
            .send(Message::Playlist(PlaylistMessage::OperationRejected {
                action: action.to_string(),
                reason,
            }));
    }

    fn persist(&self) {
        let playlists: Vec<_> = self.playlists.iter().cloned().collect();
        if let Err(err) = self
            .gateway
            .save(self.library.songs(), &playlists, &self.settings)
        {
            error!("Failed to save data file: {}", err);
            let _ = self
                .bus_producer
                .send(Message::Library(LibraryMessage::PersistenceFailed(
                    err.to_string(),
                )));
        }
    }

    fn broadcast_playlists_changed(&self) {
        let summaries: Vec<PlaylistSummary> = self
            .playlists
            .iter()
            .map(|playlist| PlaylistSummary {
                name: playlist.name.clone(),
                song_count: playlist.positions.len(),
                cover: playlist.cover.clone(),
            })
            .collect();
        let _ = self
            .bus_producer
            .send(Message::Playlist(PlaylistMessage::PlaylistsChanged(
                summaries,
            )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use tokio::sync::broadcast::{self, error::TryRecvError};

    use crate::acquisition::{AcquisitionManager, AcquisitionPipeline};
    use crate::error::StoreError;
    use crate::playlists::PROTECTED_PLAYLIST;
    use crate::protocol::{ImportReport, TrackReference};
    use crate::services::{AudioResolver, CatalogHit, LyricsProvider, TrackCatalog};

    struct StubCatalog;

    impl TrackCatalog for StubCatalog {
        fn search_tracks(&self, _query: &str) -> Result<Vec<TrackReference>, String> {
            Ok(Vec::new())
        }

        fn fetch_playlist_items(&self, _link: &str) -> Result<Vec<TrackReference>, String> {
            Ok(Vec::new())
        }

        fn lookup(&self, _title: &str, _artist: &str) -> Result<CatalogHit, String> {
            Ok(CatalogHit::default())
        }
    }

    /// Fails any query containing "Broken"; streams bytes otherwise.
    struct StubResolver;

    impl AudioResolver for StubResolver {
        fn resolve(&self, query: &str) -> Result<Box<dyn Read + Send>, String> {
            if query.contains("Broken") {
                Err("no stream found".to_string())
            } else {
                Ok(Box::new(Cursor::new(b"bytes".to_vec())))
            }
        }
    }

    struct StubLyrics;

    impl LyricsProvider for StubLyrics {
        fn fetch(&self, _title: &str, _artist: &str) -> Result<Option<String>, String> {
            Ok(None)
        }
    }

    struct Harness {
        bus_sender: broadcast::Sender<Message>,
        receiver: broadcast::Receiver<Message>,
        temp_root: PathBuf,
    }

    impl Harness {
        fn new() -> Self {
            let temp_root =
                std::env::temp_dir().join(format!("tunedock-cm-{}", Uuid::new_v4()));
            let (bus_sender, _) = broadcast::channel(4096);
            // Subscribe before spawning so the restore notifications are not
            // missed.
            let receiver = bus_sender.subscribe();

            let collection_receiver = bus_sender.subscribe();
            let collection_sender = bus_sender.clone();
            let gateway = PersistenceGateway::new(temp_root.join("data.json"));
            thread::spawn(move || {
                let mut manager =
                    CollectionManager::new(collection_receiver, collection_sender, gateway);
                manager.run();
            });

            let acquisition_receiver = bus_sender.subscribe();
            let acquisition_sender = bus_sender.clone();
            let download_dir = temp_root.join("downloads");
            thread::spawn(move || {
                let pipeline = Arc::new(AcquisitionPipeline::new(
                    crate::services::http_agent(
                        Duration::from_secs(1),
                        Duration::from_secs(1),
                    ),
                    Arc::new(StubCatalog),
                    Arc::new(StubResolver),
                    Arc::new(StubLyrics),
                    download_dir.clone(),
                    download_dir.join("default-cover.png"),
                ));
                let mut manager = AcquisitionManager::new(
                    acquisition_receiver,
                    acquisition_sender,
                    pipeline,
                    2,
                );
                manager.run();
            });

            let mut receiver = receiver;
            wait_for(&mut receiver, |message| {
                matches!(
                    message,
                    Message::Playlist(PlaylistMessage::PlaylistsChanged(_))
                )
            });

            Self {
                bus_sender,
                receiver,
                temp_root,
            }
        }

        fn send(&self, message: Message) {
            self.bus_sender
                .send(message)
                .expect("failed to send message to bus");
        }

        fn wait_for<F>(&mut self, predicate: F) -> Message
        where
            F: FnMut(&Message) -> bool,
        {
            wait_for(&mut self.receiver, predicate)
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.temp_root).ok();
        }
    }

    fn wait_for<F>(receiver: &mut broadcast::Receiver<Message>, mut predicate: F) -> Message
    where
        F: FnMut(&Message) -> bool,
    {
        let start = Instant::now();
        loop {
            if start.elapsed() > Duration::from_secs(5) {
                panic!("timed out waiting for expected message");
            }
            match receiver.try_recv() {
                Ok(message) => {
                    if predicate(&message) {
                        return message;
                    }
                }
                Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Closed) => panic!("bus closed while waiting for message"),
            }
        }
    }

    fn reference(title: &str, artist: &str) -> TrackReference {
        TrackReference {
            title: title.to_string(),
            artist: artist.to_string(),
            external_id: None,
            cover_url: None,
        }
    }

    #[test]
    fn test_create_playlist_broadcasts_changed_summaries() {
        let mut harness = Harness::new();
        harness.send(Message::Playlist(PlaylistMessage::Create {
            name: "Gym".to_string(),
            positions: Vec::new(),
            cover: CoverSpec::Auto,
        }));

        let message = harness.wait_for(|message| {
            matches!(
                message,
                Message::Playlist(PlaylistMessage::PlaylistsChanged(summaries))
                    if summaries.iter().any(|summary| summary.name == "Gym")
            )
        });
        if let Message::Playlist(PlaylistMessage::PlaylistsChanged(summaries)) = message {
            assert!(summaries
                .iter()
                .any(|summary| summary.name == PROTECTED_PLAYLIST));
        }
    }

    #[test]
    fn test_deleting_protected_playlist_is_rejected() {
        let mut harness = Harness::new();
        harness.send(Message::Playlist(PlaylistMessage::Delete(
            PROTECTED_PLAYLIST.to_string(),
        )));

        let message = harness.wait_for(|message| {
            matches!(
                message,
                Message::Playlist(PlaylistMessage::OperationRejected { .. })
            )
        });
        if let Message::Playlist(PlaylistMessage::OperationRejected { reason, .. }) = message {
            assert_eq!(reason, StoreError::ProtectedName);
        }
    }

    #[test]
    fn test_import_batch_end_to_end() {
        let mut harness = Harness::new();
        harness.send(Message::Import(ImportMessage::Start {
            playlist_name: "Mix".to_string(),
            references: vec![
                reference("First", "Artist"),
                reference("Broken", "Nobody"),
                reference("Second", "Artist"),
            ],
        }));

        let message = harness.wait_for(|message| {
            matches!(message, Message::Import(ImportMessage::Completed(_)))
        });
        let Message::Import(ImportMessage::Completed(ImportReport {
            playlist_name,
            downloaded,
            skipped,
            failed,
        })) = message
        else {
            unreachable!()
        };
        assert_eq!(playlist_name.as_deref(), Some("Mix"));
        assert_eq!(downloaded, 2);
        assert_eq!(skipped, 0);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].title, "Broken");
    }

    #[test]
    fn test_second_import_is_rejected_while_first_runs() {
        let mut harness = Harness::new();
        harness.send(Message::Import(ImportMessage::Start {
            playlist_name: "One".to_string(),
            references: vec![reference("Track A", "Artist")],
        }));
        harness.send(Message::Import(ImportMessage::Start {
            playlist_name: "Two".to_string(),
            references: vec![reference("Track B", "Artist")],
        }));

        let message = harness
            .wait_for(|message| matches!(message, Message::Import(ImportMessage::Rejected(_))));
        if let Message::Import(ImportMessage::Rejected(name)) = message {
            assert_eq!(name, "Two");
        }
    }
}
