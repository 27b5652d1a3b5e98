//! Event-bus protocol shared by all runtime components.
//!
//! This module defines all message payloads exchanged between the collection,
//! acquisition, and playback managers and whatever front end drives them.

use std::path::PathBuf;

use crate::{
    error::{AcquisitionError, AcquisitionStage, StoreError},
    library::Song,
    playlists::CoverSpec,
};

/// Queue advance policy applied when navigating beyond the current entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    Repeat,    // Advance sequentially, wrap at the end of the queue
    RepeatOne, // Restart the current entry when it finishes
    Shuffle,   // Pick a random other entry on advance
}

/// Remote track reference entering the acquisition boundary.
///
/// This is the one shape used for search results, playlist-import items, and
/// single-track downloads alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackReference {
    pub title: String,
    pub artist: String,
    pub external_id: Option<String>,
    pub cover_url: Option<String>,
}

/// One playback-queue slot: a library position plus the audio path snapshot
/// taken when the queue was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub position: usize,
    pub path: PathBuf,
}

/// Compact playlist row for front-end listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub name: String,
    pub song_count: usize,
    pub cover: CoverSpec,
}

/// Terminal state of one import item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportItemStatus {
    /// Dedup hit; the existing library position was recorded.
    AlreadyInLibrary(usize),
    /// Pipeline success; the new library position was recorded.
    Downloaded(usize),
    Failed(AcquisitionError),
}

/// Aggregate result of one import batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    /// Name the playlist was created under, `None` when nothing was collected.
    pub playlist_name: Option<String>,
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: Vec<TrackReference>,
}

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Library(LibraryMessage),
    Playlist(PlaylistMessage),
    Playback(PlaybackMessage),
    Acquisition(AcquisitionMessage),
    Import(ImportMessage),
}

/// Library-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum LibraryMessage {
    /// Delete the songs at the given library positions, cascading into every
    /// playlist and removing the on-disk artifacts.
    DeleteSongs(Vec<usize>),
    /// Acquire a single track and append it to the library.
    DownloadTrack(TrackReference),
    /// Full library snapshot after startup restore.
    LibraryRestored(Vec<Song>),
    SongAdded {
        position: usize,
        song: Song,
    },
    /// Library positions that were removed, in ascending order. Surviving
    /// positions shift down by the count of removed positions below them.
    SongsRemoved {
        removed: Vec<usize>,
    },
    /// A durable-store write failed; surfaced, not retried.
    PersistenceFailed(String),
    RecentlyPlayedChanged(Vec<String>),
}

/// Playlist-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum PlaylistMessage {
    Create {
        name: String,
        positions: Vec<usize>,
        cover: CoverSpec,
    },
    Rename {
        old: String,
        new: String,
    },
    Delete(String),
    AddSong {
        name: String,
        position: usize,
    },
    RemoveSong {
        name: String,
        position: usize,
    },
    /// Move `moved` so it lands in the slot currently held by `target`. Both
    /// are position values (library identity), not slots.
    Reorder {
        name: String,
        moved: usize,
        target: usize,
    },
    /// Build a queue from the playlist and start playback at its head.
    PlayPlaylist(String),
    /// Build a queue from the playlist and start at the given library
    /// position; falls back to a single-entry queue when the position is not
    /// a member.
    PlayFromPlaylist {
        name: String,
        position: usize,
    },
    /// Append the playlist's entries to the current queue.
    QueuePlaylist(String),
    /// Resolve the cover sources for one playlist (cached).
    RequestCover(String),
    CoverResolved {
        name: String,
        sources: Vec<PathBuf>,
    },
    PlaylistsChanged(Vec<PlaylistSummary>),
    OperationRejected {
        action: String,
        reason: StoreError,
    },
}

/// Playback-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum PlaybackMessage {
    /// Replace the queue with the given entries and bind the start entry.
    LoadQueue {
        entries: Vec<QueueEntry>,
        start_index: usize,
    },
    PlayPause,
    Next,
    Previous,
    /// End-of-media event from the audio output collaborator.
    EndOfMedia,
    SetMode(PlayMode),
    SeekMs(u64),
    /// Insert an entry directly after the cursor, moving it if already queued.
    InsertNext(QueueEntry),
    /// Append an entry to the queue tail unless already present.
    Append(QueueEntry),
    AppendMany(Vec<QueueEntry>),
    /// New queue ordering expressed as position values.
    ReorderQueue(Vec<usize>),
    ModeChanged(PlayMode),
    /// An entry was bound and playback started.
    TrackStarted {
        position: usize,
    },
    PlaybackStopped,
}

/// Acquisition-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum AcquisitionMessage {
    /// Run the pipeline for one reference. `job` correlates the result.
    Fetch {
        job: String,
        reference: TrackReference,
    },
    Progress {
        job: String,
        stage: AcquisitionStage,
        detail: String,
    },
    Completed {
        job: String,
        song: Song,
    },
    Failed {
        job: String,
        reference: TrackReference,
        error: AcquisitionError,
    },
}

/// Import-batch commands and notifications.
#[derive(Debug, Clone)]
pub enum ImportMessage {
    Start {
        playlist_name: String,
        references: Vec<TrackReference>,
    },
    /// An import was requested while another batch is running.
    Rejected(String),
    /// Per-item progress, strictly in submission order.
    ItemFinished {
        index: usize,
        reference: TrackReference,
        status: ImportItemStatus,
    },
    Completed(ImportReport),
}
