//! Acquisition pipeline: one remote track reference in, one local song out.
//!
//! Three independently fault-tolerant steps (cover, audio, lyrics) run in
//! order per item on a bounded worker pool. Cover and lyrics degrade
//! silently; a failed audio fetch is fatal for the item.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use log::{debug, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};

use crate::error::{AcquisitionError, AcquisitionStage};
use crate::library::Song;
use crate::protocol::{AcquisitionMessage, Message, TrackReference};
use crate::services::{AudioResolver, LyricsProvider, TrackCatalog};

/// Filesystem-safe slug: reserved characters and spaces become underscores,
/// non-ASCII is stripped, and the result is capped at 200 bytes.
pub fn slug(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if !ch.is_ascii() {
            continue;
        }
        match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | ' ' => out.push('_'),
            other => out.push(other),
        }
    }
    out.truncate(200);
    out
}

/// Synthesized id for tracks without a stable external id. Derived from
/// title and artist only, so same-named tracks can collide.
pub fn fallback_id(title: &str, artist: &str) -> String {
    format!("fallback_{}_{}", slug(title), slug(artist))
}

/// Reads a stream to completion and persists it via temp file + rename.
fn persist_stream(mut reader: Box<dyn Read + Send>, path: &Path) -> Result<(), String> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|err| format!("stream read failed: {err}"))?;
    if bytes.is_empty() {
        return Err("stream was empty".to_string());
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("bin");
    let temp_path = path.with_extension(format!("{extension}.tmp"));
    std::fs::write(&temp_path, &bytes).map_err(|err| format!("write failed: {err}"))?;
    if let Err(err) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(format!("rename failed: {err}"));
    }
    Ok(())
}

/// Turns a remote track reference into a fully populated song.
pub struct AcquisitionPipeline {
    http_client: ureq::Agent,
    catalog: Arc<dyn TrackCatalog>,
    resolver: Arc<dyn AudioResolver>,
    lyrics: Arc<dyn LyricsProvider>,
    download_dir: PathBuf,
    default_cover: PathBuf,
}

impl AcquisitionPipeline {
    pub fn new(
        http_client: ureq::Agent,
        catalog: Arc<dyn TrackCatalog>,
        resolver: Arc<dyn AudioResolver>,
        lyrics: Arc<dyn LyricsProvider>,
        download_dir: PathBuf,
        default_cover: PathBuf,
    ) -> Self {
        Self {
            http_client,
            catalog,
            resolver,
            lyrics,
            download_dir,
            default_cover,
        }
    }

    /// Runs the full pipeline for one reference. `progress` fires once per
    /// completed step with a short human-readable detail.
    pub fn run(
        &self,
        reference: &TrackReference,
        mut progress: impl FnMut(AcquisitionStage, &str),
    ) -> Result<Song, AcquisitionError> {
        let safe = slug(&format!("{}_{}", reference.title, reference.artist));
        let cover_target = self.download_dir.join(format!("{safe}.png"));
        let audio_path = self.download_dir.join(format!("{safe}.mp3"));
        let lyrics_path = self.download_dir.join(format!("{safe}.lrc"));

        std::fs::create_dir_all(&self.download_dir).map_err(|err| {
            AcquisitionError::new(
                AcquisitionStage::Audio,
                format!("download directory unavailable: {err}"),
            )
        })?;

        let mut cover_url = reference.cover_url.clone();
        let mut external_id = reference.external_id.clone();
        if cover_url.is_none() || external_id.is_none() {
            match self.catalog.lookup(&reference.title, &reference.artist) {
                Ok(hit) => {
                    cover_url = cover_url.or(hit.cover_url);
                    external_id = external_id.or(hit.external_id);
                    progress(AcquisitionStage::Catalog, "Metadata resolved");
                }
                Err(err) => {
                    debug!(
                        "Metadata lookup failed for '{}' by '{}': {}",
                        reference.title, reference.artist, err
                    );
                    progress(AcquisitionStage::Catalog, "Metadata lookup failed");
                }
            }
        }

        let cover_path = match &cover_url {
            Some(url) => match self.download_cover(url, &cover_target) {
                Ok(()) => {
                    progress(AcquisitionStage::Cover, "Cover downloaded");
                    cover_target
                }
                Err(err) => {
                    warn!("Cover download failed for '{}': {}", reference.title, err);
                    progress(AcquisitionStage::Cover, "Cover download failed");
                    self.default_cover.clone()
                }
            },
            None => self.default_cover.clone(),
        };

        let query = format!("{} {} audio", reference.title, reference.artist);
        let stream = self
            .resolver
            .resolve(&query)
            .map_err(|err| AcquisitionError::new(AcquisitionStage::Audio, err))?;
        persist_stream(stream, &audio_path)
            .map_err(|err| AcquisitionError::new(AcquisitionStage::Audio, err))?;
        progress(AcquisitionStage::Audio, "Audio downloaded");

        let lyrics_text = match self.lyrics.fetch(&reference.title, &reference.artist) {
            Ok(text) => text,
            Err(err) => {
                warn!("Lyrics fetch failed for '{}': {}", reference.title, err);
                None
            }
        };
        if let Err(err) = std::fs::write(&lyrics_path, lyrics_text.as_deref().unwrap_or("")) {
            warn!("Failed to write lyrics file for '{}': {}", reference.title, err);
        }
        progress(
            AcquisitionStage::Lyrics,
            if lyrics_text.is_some() {
                "Lyrics fetched"
            } else {
                "No lyrics"
            },
        );

        let id = external_id
            .unwrap_or_else(|| fallback_id(&reference.title, &reference.artist));
        Ok(Song {
            id,
            title: reference.title.clone(),
            artist: reference.artist.clone(),
            audio_path,
            cover_path,
            lyrics_path,
        })
    }

    fn download_cover(&self, url: &str, path: &Path) -> Result<(), String> {
        let response = self
            .http_client
            .get(url)
            .call()
            .map_err(|err| format!("cover request failed: {err}"))?;
        persist_stream(Box::new(response.into_reader()), path)
    }
}

/// Manager feeding the worker pool from the bus.
///
/// One item occupies one worker for its full step sequence; items run in
/// parallel across workers up to the pool limit.
pub struct AcquisitionManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    pipeline: Arc<AcquisitionPipeline>,
    worker_count: usize,
}

impl AcquisitionManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        pipeline: Arc<AcquisitionPipeline>,
        worker_count: usize,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            pipeline,
            worker_count: worker_count.max(1),
        }
    }

    pub fn run(&mut self) {
        let (job_tx, job_rx) = mpsc::channel::<(String, TrackReference)>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        for worker_index in 0..self.worker_count {
            let job_rx = Arc::clone(&job_rx);
            let pipeline = Arc::clone(&self.pipeline);
            let bus_producer = self.bus_producer.clone();
            thread::spawn(move || loop {
                let job = {
                    let receiver = job_rx.lock().expect("job receiver lock poisoned");
                    receiver.recv()
                };
                let Ok((job, reference)) = job else {
                    break;
                };

                debug!(
                    "Acquisition worker {}: fetching '{}' by '{}'",
                    worker_index, reference.title, reference.artist
                );
                let result = pipeline.run(&reference, |stage, detail| {
                    let _ = bus_producer.send(Message::Acquisition(AcquisitionMessage::Progress {
                        job: job.clone(),
                        stage,
                        detail: detail.to_string(),
                    }));
                });
                match result {
                    Ok(song) => {
                        let _ = bus_producer.send(Message::Acquisition(
                            AcquisitionMessage::Completed { job, song },
                        ));
                    }
                    Err(error) => {
                        warn!(
                            "Acquisition failed for '{}' by '{}': {}",
                            reference.title, reference.artist, error
                        );
                        let _ = bus_producer.send(Message::Acquisition(
                            AcquisitionMessage::Failed {
                                job,
                                reference,
                                error,
                            },
                        ));
                    }
                }
            });
        }

        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Acquisition(AcquisitionMessage::Fetch { job, reference })) => {
                    debug!(
                        "AcquisitionManager: queueing '{}' by '{}'",
                        reference.title, reference.artist
                    );
                    if job_tx.send((job, reference)).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("AcquisitionManager lagged, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
