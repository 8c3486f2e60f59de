use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[command(name = "airwave")]
#[command(about = "Internet radio playback tools")]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List configured stations.
    Stations,

    /// Split a raw stream title into artist and title.
    Parse {
        /// Raw metadata string, e.g. "Coldplay - Yellow".
        raw: String,

        /// Station whose name and description fill empty fields.
        #[arg(long)]
        station: Option<String>,
    },

    /// Resolve artwork for a raw stream title through the configured provider.
    Artwork {
        /// Raw metadata string, e.g. "Coldplay - Yellow".
        raw: String,

        /// Station whose artwork is the fallback.
        #[arg(long)]
        station: Option<String>,
    },

    /// Print the config file path.
    ConfigPath,
}
