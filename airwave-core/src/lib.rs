pub mod artwork;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod paths;
pub mod provider;
pub mod runner;
pub mod session;
pub mod state;
pub mod station;
pub mod task;
pub mod telemetry;
pub mod track;

#[cfg(test)]
mod testing;

pub use artwork::{
    ArtworkResolver, ArtworkSettings, ArtworkSource, HttpImageLoader, ImageLoader,
    ResolvedArtwork,
};
pub use cache::ArtworkCache;
pub use config::{
    ArtworkConfig, ArtworkProviderType, Config, EngineConfig, LoggingConfig, PlaybackConfig,
    TelemetryConfig,
};
pub use engine::{EngineEvent, EngineHandle, EngineSettings, StreamEngine};
pub use error::{CoreError, Result};
pub use metadata::ParsedMetadata;
pub use paths::{
    config_dir, config_path, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME, LOG_FILE_NAME,
};
pub use provider::{ArtworkProvider, ArtworkQuery};
pub use runner::{SessionHandle, SessionRunner};
pub use session::{
    Command, NowPlayingDisplay, PlaybackSession, SessionEvent, SessionSettings, SessionSnapshot,
};
pub use state::{Controls, PlaybackState, ResumeState, SeekDirection, StopReason};
pub use station::Station;
pub use task::RepeatingTask;
pub use telemetry::{AudioLevels, BufferStatus, TelemetrySampler, TelemetrySnapshot};
pub use track::{ArtworkImage, Track};
