//! Manager owning the playback controller and the audio output collaborator.

use log::{debug, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};

use crate::{
    audio_output::AudioOutput,
    library::PositionRemap,
    playback::{PlaybackController, PlaybackEvent},
    protocol::{LibraryMessage, Message, PlayMode, PlaybackMessage},
};

pub struct PlaybackManager {
    controller: PlaybackController,
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
}

impl PlaybackManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        mode: PlayMode,
        output: Box<dyn AudioOutput>,
    ) -> Self {
        Self {
            controller: PlaybackController::new(mode, output),
            bus_consumer,
            bus_producer,
        }
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => self.handle_message(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("PlaybackManager lagged, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Playback(message) => match message {
                PlaybackMessage::LoadQueue {
                    entries,
                    start_index,
                } => {
                    debug!("PlaybackManager: loading queue of {} entries", entries.len());
                    let event = self.controller.load_queue(entries, start_index);
                    self.emit(event);
                }
                PlaybackMessage::PlayPause => {
                    let event = self.controller.play_pause();
                    self.emit(event);
                }
                PlaybackMessage::Next => {
                    let event = self.controller.next();
                    self.emit(event);
                }
                PlaybackMessage::Previous => {
                    let event = self.controller.prev();
                    self.emit(event);
                }
                PlaybackMessage::EndOfMedia => {
                    let event = self.controller.on_end_of_media();
                    self.emit(event);
                }
                PlaybackMessage::SetMode(mode) => {
                    self.controller.set_mode(mode);
                    let _ = self
                        .bus_producer
                        .send(Message::Playback(PlaybackMessage::ModeChanged(mode)));
                }
                PlaybackMessage::SeekMs(position_ms) => {
                    self.controller.seek_ms(position_ms);
                }
                PlaybackMessage::InsertNext(entry) => {
                    let event = self.controller.insert_next(entry);
                    self.emit(event);
                }
                PlaybackMessage::Append(entry) => {
                    let event = self.controller.append(entry);
                    self.emit(event);
                }
                PlaybackMessage::AppendMany(entries) => {
                    let event = self.controller.append_many(entries);
                    self.emit(event);
                }
                PlaybackMessage::ReorderQueue(new_order) => {
                    let event = self.controller.reorder_queue(new_order);
                    self.emit(event);
                }
                // Notifications this manager itself publishes.
                PlaybackMessage::ModeChanged(_)
                | PlaybackMessage::TrackStarted { .. }
                | PlaybackMessage::PlaybackStopped => {}
            },
            Message::Library(LibraryMessage::SongsRemoved { removed }) => {
                let remap = PositionRemap::from_removed(removed);
                let event = self.controller.apply_removal(&remap);
                self.emit(event);
            }
            _ => {}
        }
    }

    fn emit(&self, event: Option<PlaybackEvent>) {
        match event {
            Some(PlaybackEvent::Started { position }) => {
                let _ = self
                    .bus_producer
                    .send(Message::Playback(PlaybackMessage::TrackStarted {
                        position,
                    }));
            }
            Some(PlaybackEvent::Stopped) => {
                let _ = self
                    .bus_producer
                    .send(Message::Playback(PlaybackMessage::PlaybackStopped));
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread;
    use std::time::{Duration, Instant};
    use tokio::sync::broadcast::{self, error::TryRecvError};

    use crate::audio_output::NullAudioOutput;
    use crate::protocol::QueueEntry;

    fn entry(position: usize) -> QueueEntry {
        QueueEntry {
            position,
            path: PathBuf::from(format!("/tmp/{position}.mp3")),
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

    #[test]
    fn test_load_queue_broadcasts_track_started() {
        let (bus_sender, _) = broadcast::channel(256);
        let mut receiver = bus_sender.subscribe();
        let manager_receiver = bus_sender.subscribe();
        let manager_sender = bus_sender.clone();
        thread::spawn(move || {
            let mut manager = PlaybackManager::new(
                manager_receiver,
                manager_sender,
                PlayMode::Repeat,
                Box::new(NullAudioOutput),
            );
            manager.run();
        });

        bus_sender
            .send(Message::Playback(PlaybackMessage::LoadQueue {
                entries: vec![entry(4), entry(9)],
                start_index: 1,
            }))
            .expect("bus send should succeed");

        let message = wait_for(&mut receiver, |message| {
            matches!(
                message,
                Message::Playback(PlaybackMessage::TrackStarted { .. })
            )
        });
        if let Message::Playback(PlaybackMessage::TrackStarted { position }) = message {
            assert_eq!(position, 9);
        }
    }

    #[test]
    fn test_end_of_media_advances_and_announces_next_entry() {
        let (bus_sender, _) = broadcast::channel(256);
        let mut receiver = bus_sender.subscribe();
        let manager_receiver = bus_sender.subscribe();
        let manager_sender = bus_sender.clone();
        thread::spawn(move || {
            let mut manager = PlaybackManager::new(
                manager_receiver,
                manager_sender,
                PlayMode::Repeat,
                Box::new(NullAudioOutput),
            );
            manager.run();
        });

        bus_sender
            .send(Message::Playback(PlaybackMessage::LoadQueue {
                entries: vec![entry(1), entry(2)],
                start_index: 0,
            }))
            .expect("bus send should succeed");
        wait_for(&mut receiver, |message| {
            matches!(
                message,
                Message::Playback(PlaybackMessage::TrackStarted { position: 1 })
            )
        });

        bus_sender
            .send(Message::Playback(PlaybackMessage::EndOfMedia))
            .expect("bus send should succeed");
        wait_for(&mut receiver, |message| {
            matches!(
                message,
                Message::Playback(PlaybackMessage::TrackStarted { position: 2 })
            )
        });
    }
}
