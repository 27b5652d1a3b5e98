//! Remote collaborator abstractions and concrete implementations.
//!
//! The acquisition pipeline only ever talks to these traits; each concrete
//! adapter owns its HTTP plumbing.

pub mod audio_resolver;
pub mod lrclib;
pub mod remote_catalog;

use std::io::Read;
use std::time::Duration;

use crate::protocol::TrackReference;

/// Metadata hit for one (title, artist) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogHit {
    pub cover_url: Option<String>,
    pub external_id: Option<String>,
}

/// Track metadata catalog: free-text search, playlist expansion, and
/// per-track lookup.
pub trait TrackCatalog: Send + Sync {
    fn search_tracks(&self, query: &str) -> Result<Vec<TrackReference>, String>;
    /// Expands a shared playlist link into its track references, in order.
    fn fetch_playlist_items(&self, link: &str) -> Result<Vec<TrackReference>, String>;
    fn lookup(&self, title: &str, artist: &str) -> Result<CatalogHit, String>;
}

/// Resolves a free-text query to a downloadable audio stream.
pub trait AudioResolver: Send + Sync {
    fn resolve(&self, query: &str) -> Result<Box<dyn Read + Send>, String>;
}

/// Fetches synced or plain lyrics for one track.
pub trait LyricsProvider: Send + Sync {
    /// `Ok(None)` when the provider has nothing for this track.
    fn fetch(&self, title: &str, artist: &str) -> Result<Option<String>, String>;
}

/// Shared agent construction with the engine's timeouts.
pub fn http_agent(connect_timeout: Duration, request_timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(connect_timeout)
        .timeout_read(request_timeout)
        .timeout_write(request_timeout)
        .build()
}
