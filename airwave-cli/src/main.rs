mod cli;

use airwave_artwork_itunes::ItunesProvider;
use airwave_artwork_lastfm::LastFmProvider;
use airwave_core::{
    metadata, ArtworkImage, ArtworkProvider, ArtworkProviderType, ArtworkQuery, ArtworkResolver,
    Config, CoreError, HttpImageLoader, Station,
};
use clap::Parser;
use cli::{Cli, Command};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);

    if let Command::ConfigPath = cli.command {
        println!("{}", config_path.display());
        return ExitCode::SUCCESS;
    }

    // Check config for logging.enabled before full config load
    init_tracing(check_file_logging_enabled(&config_path));

    let config = match Config::load_or_create_at(&config_path) {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            println!(
                "Created a config template at {}. Add your stations and run again.",
                path.display()
            );
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &Config) -> Result<(), CoreError> {
    match command {
        Command::Stations => {
            list_stations(config);
            Ok(())
        }
        Command::Parse { raw, station } => {
            let parsed = match station {
                Some(id) => metadata::parse_for_station(&raw, find_station(config, &id)?),
                None => metadata::parse(&raw),
            };
            println!("artist: {}", parsed.artist);
            println!("title:  {}", parsed.title);
            Ok(())
        }
        Command::Artwork { raw, station } => {
            resolve_artwork(config, &raw, station.as_deref()).await
        }
        // Answered before the config is loaded
        Command::ConfigPath => Ok(()),
    }
}

fn list_stations(config: &Config) {
    if config.stations.is_empty() {
        println!("No stations configured");
        return;
    }
    for station in &config.stations {
        println!("{:<12} {} - {}", station.id, station.name, station.description);
        println!("{:<12} {}", "", station.stream_url);
    }
}

fn find_station<'a>(config: &'a Config, id: &str) -> Result<&'a Station, CoreError> {
    config.station(id).ok_or_else(|| CoreError::ConfigInvalid {
        message: format!("no station with id '{id}'"),
    })
}

async fn resolve_artwork(
    config: &Config,
    raw: &str,
    station: Option<&str>,
) -> Result<(), CoreError> {
    let station = match station {
        Some(id) => find_station(config, id)?.clone(),
        None => Station::new("", "", "", "", ""),
    };

    let provider = create_provider(config)?;
    let resolver = ArtworkResolver::new(
        provider,
        Box::new(HttpImageLoader::new()?),
        config.artwork_settings(),
    );
    info!(
        "Resolving artwork with provider: {}",
        resolver.provider_name().unwrap_or("none")
    );

    let parsed = metadata::parse_for_station(raw, &station);
    let query = ArtworkQuery::new(parsed.artist, parsed.title);
    let resolved = resolver.resolve(&query, &station).await;

    println!("source: {:?}", resolved.source);
    println!("url:    {}", resolved.url);
    println!("loaded: {}", resolved.loaded);
    match resolved.image {
        ArtworkImage::Downloaded(bytes) => println!("image:  {} bytes", bytes.len()),
        ArtworkImage::Bundled(name) => println!("image:  bundled '{name}'"),
        ArtworkImage::Empty => println!("image:  none"),
    }
    Ok(())
}

/// Create the artwork provider selected in config
fn create_provider(config: &Config) -> Result<Option<Box<dyn ArtworkProvider>>, CoreError> {
    let provider: Box<dyn ArtworkProvider> = match config.artwork.provider {
        ArtworkProviderType::Lastfm => {
            let api_key = config.artwork.lastfm_api_key.clone().unwrap_or_default();
            Box::new(LastFmProvider::new(api_key)?)
        }
        ArtworkProviderType::Itunes => Box::new(ItunesProvider::new()?),
        ArtworkProviderType::None => return Ok(None),
    };
    Ok(Some(provider))
}

/// Check if file logging is enabled by reading the config file.
/// Returns `false` if config doesn't exist or can't be parsed.
fn check_file_logging_enabled(config_path: &Path) -> bool {
    // Minimal structs to parse just the logging.enabled field
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        enabled: bool,
    }

    let Ok(content) = std::fs::read_to_string(config_path) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.enabled)
        .unwrap_or(false)
}

/// Initialize tracing with console output and optional file logging
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        let log_path: PathBuf = airwave_core::paths::log_file_path();

        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(&log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
