//! Audio stream resolver backed by a configured extraction endpoint.

use std::io::Read;

use serde_json::Value;

use crate::services::AudioResolver;

pub struct RemoteAudioResolver {
    http_client: ureq::Agent,
    endpoint: String,
}

impl RemoteAudioResolver {
    pub fn new(http_client: ureq::Agent, endpoint: String) -> Self {
        Self {
            http_client,
            endpoint,
        }
    }
}

/// Extracts the stream url from a resolver response.
fn stream_url(parsed: &Value) -> Option<String> {
    parsed
        .get("stream_url")
        .and_then(|value| value.as_str())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

impl AudioResolver for RemoteAudioResolver {
    fn resolve(&self, query: &str) -> Result<Box<dyn Read + Send>, String> {
        if self.endpoint.trim().is_empty() {
            return Err("resolver endpoint not configured".to_string());
        }
        let url = format!(
            "{}/resolve?q={}",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(query)
        );
        let response = self
            .http_client
            .get(&url)
            .call()
            .map_err(|err| format!("resolver request failed: {err}"))?;
        let parsed: Value = response
            .into_json()
            .map_err(|err| format!("resolver response parse failed: {err}"))?;
        let stream_url =
            stream_url(&parsed).ok_or_else(|| "resolver returned no stream".to_string())?;

        let stream = self
            .http_client
            .get(&stream_url)
            .call()
            .map_err(|err| format!("stream request failed: {err}"))?;
        Ok(Box::new(stream.into_reader()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stream_url_rejects_missing_or_empty() {
        assert_eq!(stream_url(&json!({})), None);
        assert_eq!(stream_url(&json!({"stream_url": ""})), None);
        assert_eq!(
            stream_url(&json!({"stream_url": "https://cdn/a.mp3"})),
            Some("https://cdn/a.mp3".to_string())
        );
    }

    #[test]
    fn test_unconfigured_endpoint_is_an_error() {
        let resolver = RemoteAudioResolver::new(
            crate::services::http_agent(
                std::time::Duration::from_secs(1),
                std::time::Duration::from_secs(1),
            ),
            String::new(),
        );
        let result = resolver.resolve("some song audio");
        assert!(result.is_err());
    }
}
