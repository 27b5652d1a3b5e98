//! Lyrics provider backed by the lrclib.net search API.

use serde_json::Value;

use crate::services::LyricsProvider;

pub struct LrclibClient {
    http_client: ureq::Agent,
    endpoint: String,
}

impl LrclibClient {
    pub fn new(http_client: ureq::Agent, endpoint: String) -> Self {
        Self {
            http_client,
            endpoint,
        }
    }

    fn search_url(&self, title: &str, artist: &str) -> String {
        format!(
            "{}/api/search?track_name={}&artist_name={}",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(title),
            urlencoding::encode(artist)
        )
    }
}

/// Picks lyrics text out of a search response: synced preferred, plain as
/// fallback, `None` when the first hit has neither.
fn select_lyrics(results: &Value) -> Option<String> {
    let first = results.as_array()?.first()?;
    for key in ["syncedLyrics", "plainLyrics"] {
        if let Some(text) = first.get(key).and_then(|value| value.as_str()) {
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

impl LyricsProvider for LrclibClient {
    fn fetch(&self, title: &str, artist: &str) -> Result<Option<String>, String> {
        let url = self.search_url(title, artist);
        let response = self
            .http_client
            .get(&url)
            .call()
            .map_err(|err| format!("lyrics request failed: {err}"))?;
        let results: Value = response
            .into_json()
            .map_err(|err| format!("lyrics response parse failed: {err}"))?;
        Ok(select_lyrics(&results))
    }
}
