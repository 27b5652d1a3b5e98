//! Playback queue and the state machine driving the audio output.

use rand::{rngs::StdRng, RngExt, SeedableRng};

use crate::audio_output::AudioOutput;
use crate::library::PositionRemap;
use crate::protocol::{PlayMode, QueueEntry};

/// Controller lifecycle: no queue, queue loaded but unbound, or bound media
/// that is playing or paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Empty,
    Ready,
    Playing,
    Paused,
}

/// Notification-worthy outcome of a controller operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// A queue entry was bound and playback started.
    Started { position: usize },
    Stopped,
}

/// The active ordered list of library positions plus cursor and mode.
#[derive(Debug)]
pub struct PlaybackQueue {
    entries: Vec<QueueEntry>,
    cursor: usize,
    mode: PlayMode,
    rng: StdRng,
}

impl PlaybackQueue {
    pub fn new(mode: PlayMode) -> Self {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).expect("Failed to generate random seed");
        Self {
            entries: Vec::new(),
            cursor: 0,
            mode,
            rng: StdRng::from_seed(seed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        return self.cursor;
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.entries.get(self.cursor)
    }

    fn slot_of(&self, position: usize) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.position == position)
    }

    /// Cursor for a forward advance under the current mode. Sequential modes
    /// wrap; shuffle picks a uniform other slot and stays put on a
    /// single-entry queue.
    fn next_cursor(&mut self) -> usize {
        match self.mode {
            PlayMode::Repeat | PlayMode::RepeatOne => (self.cursor + 1) % self.entries.len(),
            PlayMode::Shuffle => {
                if self.entries.len() > 1 {
                    let mut next = self.cursor;
                    while next == self.cursor {
                        next = self.rng.random_range(0..self.entries.len());
                    }
                    next
                } else {
                    self.cursor
                }
            }
        }
    }

    /// Cursor for a backward step: always sequential, regardless of mode.
    fn prev_cursor(&self) -> usize {
        (self.cursor + self.entries.len() - 1) % self.entries.len()
    }
}

/// State machine over the playback queue, issuing transport commands to the
/// audio output collaborator.
pub struct PlaybackController {
    queue: PlaybackQueue,
    state: PlaybackState,
    /// Position value of the entry currently bound as the media source.
    bound: Option<usize>,
    output: Box<dyn AudioOutput>,
}

impl PlaybackController {
    pub fn new(mode: PlayMode, output: Box<dyn AudioOutput>) -> Self {
        Self {
            queue: PlaybackQueue::new(mode),
            state: PlaybackState::Empty,
            bound: None,
            output,
        }
    }

    pub fn state(&self) -> PlaybackState {
        return self.state;
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn bound(&self) -> Option<usize> {
        self.bound
    }

    pub fn set_mode(&mut self, mode: PlayMode) {
        self.queue.mode = mode;
    }

    /// Replaces the queue and starts playback at `start_index` (clamped).
    pub fn load_queue(
        &mut self,
        entries: Vec<QueueEntry>,
        start_index: usize,
    ) -> Option<PlaybackEvent> {
        self.queue.entries = entries;
        self.bound = None;
        if self.queue.entries.is_empty() {
            self.queue.cursor = 0;
            self.state = PlaybackState::Empty;
            return None;
        }
        self.queue.cursor = start_index.min(self.queue.entries.len() - 1);
        self.bind_and_play()
    }

    /// Binds the cursor entry on first use, then toggles play/pause.
    pub fn play_pause(&mut self) -> Option<PlaybackEvent> {
        match self.state {
            PlaybackState::Empty => None,
            PlaybackState::Ready => self.bind_and_play(),
            PlaybackState::Playing => {
                self.output.pause();
                self.state = PlaybackState::Paused;
                None
            }
            PlaybackState::Paused => {
                self.output.play();
                self.state = PlaybackState::Playing;
                None
            }
        }
    }

    pub fn next(&mut self) -> Option<PlaybackEvent> {
        if self.queue.is_empty() {
            return None;
        }
        self.queue.cursor = self.queue.next_cursor();
        self.bind_and_play()
    }

    pub fn prev(&mut self) -> Option<PlaybackEvent> {
        if self.queue.is_empty() {
            return None;
        }
        self.queue.cursor = self.queue.prev_cursor();
        self.bind_and_play()
    }

    /// Reacts to the end of the bound media. RepeatOne restarts in place
    /// without advancing the cursor; the other modes advance like `next`.
    pub fn on_end_of_media(&mut self) -> Option<PlaybackEvent> {
        if self.queue.is_empty() {
            return None;
        }
        match self.queue.mode {
            PlayMode::RepeatOne => {
                self.output.seek(0);
                self.output.play();
                self.state = PlaybackState::Playing;
                None
            }
            PlayMode::Repeat | PlayMode::Shuffle => self.next(),
        }
    }

    /// Applies a new queue ordering given as position values. The cursor
    /// follows the bound entry's identity; when the bound entry is absent
    /// from the new ordering the cursor resets to 0 and playback stops.
    pub fn reorder_queue(&mut self, new_order: Vec<usize>) -> Option<PlaybackEvent> {
        let mut reordered = Vec::with_capacity(new_order.len());
        for position in new_order {
            if let Some(slot) = self.queue.slot_of(position) {
                reordered.push(self.queue.entries[slot].clone());
            }
        }
        self.queue.entries = reordered;

        match self.bound.and_then(|bound| self.queue.slot_of(bound)) {
            Some(slot) => {
                self.queue.cursor = slot;
                None
            }
            None => {
                self.queue.cursor = 0;
                self.stop()
            }
        }
    }

    /// Inserts an entry directly after the cursor. An entry already in the
    /// queue is moved rather than duplicated; on an empty queue this loads
    /// and plays the entry.
    pub fn insert_next(&mut self, entry: QueueEntry) -> Option<PlaybackEvent> {
        if self.queue.is_empty() {
            return self.load_queue(vec![entry], 0);
        }
        if let Some(slot) = self.queue.slot_of(entry.position) {
            if slot == self.queue.cursor {
                return None;
            }
            if slot < self.queue.cursor {
                self.queue.cursor -= 1;
            }
            self.queue.entries.remove(slot);
        }
        let insert_at = (self.queue.cursor + 1).min(self.queue.entries.len());
        self.queue.entries.insert(insert_at, entry);
        None
    }

    /// Appends an entry to the tail unless already queued; on an empty queue
    /// this loads and plays the entry.
    pub fn append(&mut self, entry: QueueEntry) -> Option<PlaybackEvent> {
        if self.queue.is_empty() {
            return self.load_queue(vec![entry], 0);
        }
        if self.queue.slot_of(entry.position).is_none() {
            self.queue.entries.push(entry);
        }
        None
    }

    /// Appends many entries, skipping those already queued. On an empty queue
    /// the entries become the queue without starting playback.
    pub fn append_many(&mut self, entries: Vec<QueueEntry>) -> Option<PlaybackEvent> {
        if self.queue.is_empty() {
            if entries.is_empty() {
                return None;
            }
            self.queue.entries = entries;
            self.queue.cursor = 0;
            self.state = PlaybackState::Ready;
            return None;
        }
        for entry in entries {
            if self.queue.slot_of(entry.position).is_none() {
                self.queue.entries.push(entry);
            }
        }
        None
    }

    /// Rewrites the queue after a library removal using the same remap the
    /// playlists received. Removing the bound entry stops playback.
    pub fn apply_removal(&mut self, remap: &PositionRemap) -> Option<PlaybackEvent> {
        if remap.is_empty() || self.queue.is_empty() {
            return None;
        }

        let bound_removed = self.bound.is_some_and(|bound| remap.map(bound).is_none());
        self.queue.entries = self
            .queue
            .entries
            .iter()
            .filter_map(|entry| {
                remap.map(entry.position).map(|position| QueueEntry {
                    position,
                    path: entry.path.clone(),
                })
            })
            .collect();

        if self.queue.entries.is_empty() {
            self.queue.cursor = 0;
            self.bound = None;
            let was_active = self.state != PlaybackState::Empty;
            self.output.pause();
            self.state = PlaybackState::Empty;
            return was_active.then_some(PlaybackEvent::Stopped);
        }

        if bound_removed {
            self.queue.cursor = 0;
            return self.stop();
        }

        self.bound = self.bound.and_then(|bound| remap.map(bound));
        if let Some(slot) = self.bound.and_then(|bound| self.queue.slot_of(bound)) {
            self.queue.cursor = slot;
        } else {
            self.queue.cursor = self.queue.cursor.min(self.queue.entries.len() - 1);
        }
        None
    }

    /// Seeks within the bound media, clamped to its duration.
    pub fn seek_ms(&mut self, position_ms: u64) {
        if self.bound.is_none() {
            return;
        }
        let duration = self.output.duration_ms();
        let clamped = if duration > 0 {
            position_ms.min(duration)
        } else {
            position_ms
        };
        self.output.seek(clamped);
    }

    fn bind_and_play(&mut self) -> Option<PlaybackEvent> {
        let entry = self.queue.current()?.clone();
        self.output.set_source(&entry.path);
        self.output.play();
        self.bound = Some(entry.position);
        self.state = PlaybackState::Playing;
        Some(PlaybackEvent::Started {
            position: entry.position,
        })
    }

    fn stop(&mut self) -> Option<PlaybackEvent> {
        let was_active =
            self.state == PlaybackState::Playing || self.state == PlaybackState::Paused;
        self.output.pause();
        self.bound = None;
        self.state = if self.queue.is_empty() {
            PlaybackState::Empty
        } else {
            PlaybackState::Ready
        };
        was_active.then_some(PlaybackEvent::Stopped)
    }
}
