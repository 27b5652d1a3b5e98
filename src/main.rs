mod acquisition;
mod audio_output;
mod collection_manager;
mod config;
mod error;
mod import;
mod library;
mod persistence;
mod playback;
mod playback_manager;
mod playlists;
mod protocol;
mod services;

use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::broadcast;

use acquisition::{AcquisitionManager, AcquisitionPipeline};
use audio_output::NullAudioOutput;
use collection_manager::CollectionManager;
use config::Config;
use persistence::PersistenceGateway;
use playback_manager::PlaybackManager;
use protocol::{ImportMessage, LibraryMessage, Message, PlayMode, PlaybackMessage, PlaylistMessage, TrackReference};
use services::{remote_catalog::RemoteCatalog, TrackCatalog};

fn spawn_background_services(
    bus_sender: broadcast::Sender<Message>,
    config: &Config,
    catalog: Arc<RemoteCatalog>,
) {
    let collection_bus_receiver = bus_sender.subscribe();
    let collection_bus_sender = bus_sender.clone();
    thread::spawn(move || {
        let gateway = PersistenceGateway::new(PersistenceGateway::default_path());
        let mut collection_manager =
            CollectionManager::new(collection_bus_receiver, collection_bus_sender, gateway);
        collection_manager.run();
    });

    let acquisition_bus_receiver = bus_sender.subscribe();
    let acquisition_bus_sender = bus_sender.clone();
    let acquisition_config = config.acquisition.clone();
    let storage_config = config.storage.clone();
    thread::spawn(move || {
        let http_client = services::http_agent(
            Duration::from_secs(acquisition_config.connect_timeout_secs),
            Duration::from_secs(acquisition_config.request_timeout_secs),
        );
        let pipeline = Arc::new(AcquisitionPipeline::new(
            http_client.clone(),
            catalog,
            Arc::new(services::audio_resolver::RemoteAudioResolver::new(
                http_client.clone(),
                acquisition_config.resolver_endpoint.clone(),
            )),
            Arc::new(services::lrclib::LrclibClient::new(
                http_client,
                acquisition_config.lyrics_endpoint.clone(),
            )),
            storage_config.download_dir,
            storage_config.default_cover,
        ));
        let mut acquisition_manager = AcquisitionManager::new(
            acquisition_bus_receiver,
            acquisition_bus_sender,
            pipeline,
            acquisition_config.worker_count,
        );
        acquisition_manager.run();
    });

    let playback_bus_receiver = bus_sender.subscribe();
    let playback_bus_sender = bus_sender.clone();
    let start_mode = config.playback.start_mode;
    thread::spawn(move || {
        let mut playback_manager = PlaybackManager::new(
            playback_bus_receiver,
            playback_bus_sender,
            start_mode,
            Box::new(NullAudioOutput),
        );
        playback_manager.run();
    });
}

fn parse_mode(value: &str) -> Option<PlayMode> {
    match value {
        "repeat" => Some(PlayMode::Repeat),
        "repeat_one" => Some(PlayMode::RepeatOne),
        "shuffle" => Some(PlayMode::Shuffle),
        _ => None,
    }
}

/// Minimal command surface standing in for a front end: each line maps to
/// one bus message.
fn dispatch_command(
    line: &str,
    bus_sender: &broadcast::Sender<Message>,
    catalog: &Arc<RemoteCatalog>,
) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return true;
    }
    let (command, rest) = match trimmed.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };

    match command {
        "quit" | "exit" => return false,
        "play" => {
            let _ = bus_sender.send(Message::Playback(PlaybackMessage::PlayPause));
        }
        "next" => {
            let _ = bus_sender.send(Message::Playback(PlaybackMessage::Next));
        }
        "prev" => {
            let _ = bus_sender.send(Message::Playback(PlaybackMessage::Previous));
        }
        "mode" => match parse_mode(rest) {
            Some(mode) => {
                let _ = bus_sender.send(Message::Playback(PlaybackMessage::SetMode(mode)));
            }
            None => println!("modes: repeat, repeat_one, shuffle"),
        },
        "seek" => match rest.parse::<u64>() {
            Ok(position_ms) => {
                let _ = bus_sender.send(Message::Playback(PlaybackMessage::SeekMs(position_ms)));
            }
            Err(_) => println!("usage: seek <milliseconds>"),
        },
        "play-playlist" => {
            let _ = bus_sender.send(Message::Playlist(PlaylistMessage::PlayPlaylist(
                rest.to_string(),
            )));
        }
        "queue-playlist" => {
            let _ = bus_sender.send(Message::Playlist(PlaylistMessage::QueuePlaylist(
                rest.to_string(),
            )));
        }
        "download" => match rest.split_once('|') {
            Some((title, artist)) => {
                let _ = bus_sender.send(Message::Library(LibraryMessage::DownloadTrack(
                    TrackReference {
                        title: title.trim().to_string(),
                        artist: artist.trim().to_string(),
                        external_id: None,
                        cover_url: None,
                    },
                )));
            }
            None => println!("usage: download <title>|<artist>"),
        },
        "import" => match rest.split_once(' ') {
            Some((link, name)) if !name.trim().is_empty() => {
                match catalog.fetch_playlist_items(link) {
                    Ok(references) if !references.is_empty() => {
                        let _ = bus_sender.send(Message::Import(ImportMessage::Start {
                            playlist_name: name.trim().to_string(),
                            references,
                        }));
                    }
                    Ok(_) => println!("No tracks found for that link"),
                    Err(err) => warn!("Playlist link expansion failed: {}", err),
                }
            }
            _ => println!("usage: import <link> <playlist name>"),
        },
        _ => {
            println!(
                "commands: play, next, prev, mode <m>, seek <ms>, play-playlist <name>, \
                 queue-playlist <name>, download <title>|<artist>, import <link> <name>, quit"
            );
        }
    }
    true
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_file = config::config_file_path();
    let config = config::load_or_create(&config_file);
    debug!("Loaded config from {}", config_file.display());

    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);

    let http_client = services::http_agent(
        Duration::from_secs(config.acquisition.connect_timeout_secs),
        Duration::from_secs(config.acquisition.request_timeout_secs),
    );
    let catalog = Arc::new(RemoteCatalog::new(
        http_client,
        config.acquisition.catalog_endpoint.clone(),
    ));

    spawn_background_services(bus_sender.clone(), &config, Arc::clone(&catalog));

    info!("tunedock ready");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if !dispatch_command(&line, &bus_sender, &catalog) {
            break;
        }
    }
    Ok(())
}
