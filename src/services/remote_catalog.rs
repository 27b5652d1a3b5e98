//! Track catalog adapter backed by a configured JSON API.

use serde_json::Value;

use crate::protocol::TrackReference;
use crate::services::{CatalogHit, TrackCatalog};

pub struct RemoteCatalog {
    http_client: ureq::Agent,
    endpoint: String,
}

impl RemoteCatalog {
    pub fn new(http_client: ureq::Agent, endpoint: String) -> Self {
        Self {
            http_client,
            endpoint,
        }
    }

    fn api_url(&self, path: &str, params: &[(&str, &str)]) -> String {
        let query: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect();
        format!(
            "{}/{}?{}",
            self.endpoint.trim_end_matches('/'),
            path,
            query.join("&")
        )
    }

    fn request_json(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, String> {
        if self.endpoint.trim().is_empty() {
            return Err("catalog endpoint not configured".to_string());
        }
        let url = self.api_url(path, params);
        let response = self
            .http_client
            .get(&url)
            .call()
            .map_err(|err| format!("catalog request failed ({path}): {err}"))?;
        response
            .into_json()
            .map_err(|err| format!("catalog response parse failed ({path}): {err}"))
    }
}

/// Maps one catalog track object to a reference; `None` when the title is
/// missing.
fn track_from_value(value: &Value) -> Option<TrackReference> {
    let title = value.get("title").and_then(|v| v.as_str())?;
    let artist = value
        .get("artist")
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown Artist");
    let external_id = value
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let cover_url = value
        .get("cover_url")
        .and_then(|v| v.as_str())
        .filter(|url| !url.is_empty())
        .map(str::to_string);
    Some(TrackReference {
        title: title.to_string(),
        artist: artist.to_string(),
        external_id,
        cover_url,
    })
}

fn tracks_from_array(value: &Value, key: &str) -> Vec<TrackReference> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(track_from_value).collect())
        .unwrap_or_default()
}

impl TrackCatalog for RemoteCatalog {
    fn search_tracks(&self, query: &str) -> Result<Vec<TrackReference>, String> {
        let parsed = self.request_json("search", &[("q", query)])?;
        Ok(tracks_from_array(&parsed, "tracks"))
    }

    fn fetch_playlist_items(&self, link: &str) -> Result<Vec<TrackReference>, String> {
        let parsed = self.request_json("playlist-items", &[("link", link)])?;
        Ok(tracks_from_array(&parsed, "items"))
    }

    fn lookup(&self, title: &str, artist: &str) -> Result<CatalogHit, String> {
        let parsed = self.request_json("lookup", &[("title", title), ("artist", artist)])?;
        Ok(CatalogHit {
            cover_url: parsed
                .get("cover_url")
                .and_then(|v| v.as_str())
                .filter(|url| !url.is_empty())
                .map(str::to_string),
            external_id: parsed
                .get("id")
                .and_then(|v| v.as_str())
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        })
    }
}
