use crate::state::SeekDirection;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - please add your stations and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Missing required config field: {field}")]
    ConfigMissingField { field: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Stream errors
    #[error("No network connection available")]
    NetworkUnavailable,

    #[error("Stream connection failed: {reason}")]
    StreamConnectError { reason: String },

    // Artwork errors
    #[error("Artwork provider {provider} failed: {reason}")]
    ArtworkLookupFailed { provider: String, reason: String },

    // Session errors
    #[error("Cannot {direction} further within the stream buffer")]
    SeekRejected { direction: SeekDirection },

    #[error("No station selected")]
    NoStationSelected,

    #[error("Playback session has been torn down")]
    SessionClosed,

    // Network errors
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Network middleware failed: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    #[error("Failed to decode JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
