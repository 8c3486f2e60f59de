use crate::artwork::{ArtworkSettings, DEFAULT_IMAGE_NAME, DEFAULT_PLACEHOLDER_PATTERNS};
use crate::engine::EngineSettings;
use crate::error::{CoreError, Result};
use crate::session::SessionSettings;
use crate::station::Station;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub artwork: ArtworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub stations: Vec<Station>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_buffer_wait")]
    pub buffer_wait_secs: u32,
    #[serde(default = "default_data_timeout")]
    pub data_timeout_secs: u32,
    pub license_key1: Option<u32>,
    pub license_key2: Option<u32>,
}

const fn default_buffer_wait() -> u32 {
    15
}

const fn default_data_timeout() -> u32 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_wait_secs: default_buffer_wait(),
            data_timeout_secs: default_data_timeout(),
            license_key1: None,
            license_key2: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Seconds per rewind/fast-forward step
    #[serde(default = "default_skip_secs")]
    pub skip_secs: u32,
    /// Repeat period while a seek control is held
    #[serde(default = "default_seek_repeat")]
    pub seek_repeat_ms: u64,
}

const fn default_skip_secs() -> u32 {
    10
}

const fn default_seek_repeat() -> u64 {
    300
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            skip_secs: default_skip_secs(),
            seek_repeat_ms: default_seek_repeat(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_level_interval")]
    pub level_interval_ms: u64,
    #[serde(default = "default_buffer_interval")]
    pub buffer_interval_ms: u64,
}

const fn default_level_interval() -> u64 {
    66
}

const fn default_buffer_interval() -> u64 {
    200
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level_interval_ms: default_level_interval(),
            buffer_interval_ms: default_buffer_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArtworkProviderType {
    Lastfm,
    #[default]
    Itunes,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtworkConfig {
    #[serde(default)]
    pub provider: ArtworkProviderType,
    /// Required when `provider = "lastfm"`
    pub lastfm_api_key: Option<String>,
    #[serde(default = "default_placeholder_patterns")]
    pub placeholder_patterns: Vec<String>,
    #[serde(default = "default_image")]
    pub default_image: String,
}

fn default_placeholder_patterns() -> Vec<String> {
    DEFAULT_PLACEHOLDER_PATTERNS
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_image() -> String {
    DEFAULT_IMAGE_NAME.to_string()
}

impl Default for ArtworkConfig {
    fn default() -> Self {
        Self {
            provider: ArtworkProviderType::default(),
            lastfm_api_key: None,
            placeholder_patterns: default_placeholder_patterns(),
            default_image: default_image(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Also write logs to ~/.config/airwave/airwave.log
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Get the configuration directory path (~/.config/airwave/)
    #[must_use]
    pub fn config_dir() -> PathBuf {
        crate::paths::config_dir()
    }

    /// Get the config file path (~/.config/airwave/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location or create a template on first run
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` after writing the template, or an error if the
    /// file cannot be read, parsed or validated.
    pub fn load_or_create() -> Result<Self> {
        Self::load_or_create_at(&Self::config_path())
    }

    /// Load config from `config_path` or create a template there
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` after writing the template, or an error if the
    /// file cannot be read, parsed or validated.
    pub fn load_or_create_at(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(config_path, CONFIG_TEMPLATE)?;

            return Err(CoreError::ConfigNotFound {
                path: config_path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(config_path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissingField` for a Last.fm provider without an API key
    /// and `ConfigInvalid` for bad stations or zero intervals.
    pub fn validate(&self) -> Result<()> {
        if self.artwork.provider == ArtworkProviderType::Lastfm
            && self
                .artwork
                .lastfm_api_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            return Err(CoreError::ConfigMissingField {
                field: "artwork.lastfm_api_key".to_string(),
            });
        }

        let mut ids = HashSet::new();
        for station in &self.stations {
            if station.stream_url.trim().is_empty() {
                return Err(CoreError::ConfigInvalid {
                    message: format!("station '{}' has an empty stream_url", station.id),
                });
            }
            if !ids.insert(station.id.as_str()) {
                return Err(CoreError::ConfigInvalid {
                    message: format!("duplicate station id '{}'", station.id),
                });
            }
        }

        let intervals = [
            ("playback.skip_secs", u64::from(self.playback.skip_secs)),
            ("playback.seek_repeat_ms", self.playback.seek_repeat_ms),
            ("telemetry.level_interval_ms", self.telemetry.level_interval_ms),
            ("telemetry.buffer_interval_ms", self.telemetry.buffer_interval_ms),
        ];
        if let Some((field, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(CoreError::ConfigInvalid {
                message: format!("{field} must be greater than zero"),
            });
        }

        Ok(())
    }

    /// Look up a configured station by id
    #[must_use]
    pub fn station(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    /// One-time engine settings
    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        let license_keys = self.engine.license_key1.zip(self.engine.license_key2);
        EngineSettings {
            license_keys,
            buffer_wait_secs: self.engine.buffer_wait_secs,
            data_timeout_secs: self.engine.data_timeout_secs,
        }
    }

    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            engine: self.engine_settings(),
            skip_secs: self.playback.skip_secs,
            seek_repeat: Duration::from_millis(self.playback.seek_repeat_ms),
            level_interval: Duration::from_millis(self.telemetry.level_interval_ms),
            buffer_interval: Duration::from_millis(self.telemetry.buffer_interval_ms),
        }
    }

    #[must_use]
    pub fn artwork_settings(&self) -> ArtworkSettings {
        ArtworkSettings {
            placeholder_patterns: self.artwork.placeholder_patterns.clone(),
            default_image: self.artwork.default_image.clone(),
        }
    }
}

const CONFIG_TEMPLATE: &str = r##"# Airwave Configuration
# ~/.config/airwave/config.toml

[engine]
# One-time streaming engine setup
buffer_wait_secs = 15
data_timeout_secs = 10
# license_key1 = 0
# license_key2 = 0

[playback]
# Seconds skipped per rewind/fast-forward step
skip_secs = 10
# Repeat period while a seek button is held
seek_repeat_ms = 300

[telemetry]
level_interval_ms = 66
buffer_interval_ms = 200

[artwork]
# Provider: "itunes", "lastfm" or "none"
provider = "itunes"
# Required for "lastfm": https://www.last.fm/api/account/create
# lastfm_api_key = ""
# URLs containing any of these are treated as "no image"
placeholder_patterns = ["/noimage/"]
# Bundled image shown when nothing else resolves
default_image = "albumArt"

[logging]
# Also write logs to ~/.config/airwave/airwave.log
enabled = false

# Add one [[stations]] block per station
# [[stations]]
# id = "jazz"
# name = "Jazz FM"
# description = "Smooth Jazz"
# stream_url = "http://example.com/jazz.mp3"
# artwork_url = "https://example.com/jazz.png"
"##;
