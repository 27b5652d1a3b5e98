//! Persistent application configuration model and defaults.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::protocol::PlayMode;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Download and asset locations.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Acquisition pipeline and remote-service settings.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Playback preferences restored at startup.
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Download directory and shared assets.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StorageConfig {
    /// Directory acquired audio/cover/lyrics files are written to.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Cover used when a track's own cover cannot be fetched.
    #[serde(default = "default_cover_path")]
    pub default_cover: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            default_cover: default_cover_path(),
        }
    }
}

/// Remote-service endpoints and worker-pool sizing.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AcquisitionConfig {
    /// Bounded worker pool size; one item occupies one worker end to end.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Track catalog API base (search, playlist items, metadata lookup).
    #[serde(default)]
    pub catalog_endpoint: String,
    /// Audio stream resolver API base.
    #[serde(default)]
    pub resolver_endpoint: String,
    /// Lyrics API base.
    #[serde(default = "default_lyrics_endpoint")]
    pub lyrics_endpoint: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            catalog_endpoint: String::new(),
            resolver_endpoint: String::new(),
            lyrics_endpoint: default_lyrics_endpoint(),
        }
    }
}

/// Playback preferences restored at startup.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_play_mode")]
    pub start_mode: PlayMode,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            start_mode: default_play_mode(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tunedock")
}

fn default_cover_path() -> PathBuf {
    default_download_dir().join("default-cover.png")
}

fn default_worker_count() -> usize {
    5
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_lyrics_endpoint() -> String {
    "https://lrclib.net".to_string()
}

fn default_play_mode() -> PlayMode {
    PlayMode::Repeat
}

/// Default location of the config file in the platform config directory.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tunedock")
        .join("config.toml")
}

/// Loads the config, writing a default file when none exists yet.
pub fn load_or_create(path: &Path) -> Config {
    if !path.exists() {
        let config = Config::default();
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        save(path, &config);
        return config;
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str::<Config>(&content) {
            Ok(config) => config,
            Err(err) => {
                warn!("Failed to parse config, using defaults: {}", err);
                Config::default()
            }
        },
        Err(err) => {
            warn!("Failed to read config, using defaults: {}", err);
            Config::default()
        }
    }
}

/// Writes the config as TOML; failures are logged, never fatal.
pub fn save(path: &Path, config: &Config) {
    let serialized = match toml::to_string(config) {
        Ok(serialized) => serialized,
        Err(err) => {
            warn!("Failed to serialize config: {}", err);
            return;
        }
    };
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("Failed to create config directory: {}", err);
                return;
            }
        }
    }
    if let Err(err) = std::fs::write(path, serialized) {
        warn!("Failed to write config file {}: {}", path.display(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).expect("config should serialize");
        let parsed: Config = toml::from_str(&serialized).expect("config should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let parsed: Config = toml::from_str("").expect("empty config should parse");
        assert_eq!(parsed.acquisition.worker_count, 5);
        assert_eq!(parsed.acquisition.lyrics_endpoint, "https://lrclib.net");
        assert_eq!(parsed.playback.start_mode, PlayMode::Repeat);
    }

    #[test]
    fn test_partial_section_keeps_remaining_defaults() {
        let parsed: Config =
            toml::from_str("[acquisition]\nworker_count = 2\n").expect("config should parse");
        assert_eq!(parsed.acquisition.worker_count, 2);
        assert_eq!(parsed.acquisition.connect_timeout_secs, 5);
    }
}
