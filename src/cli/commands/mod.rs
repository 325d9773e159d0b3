//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `search`: Catalog track and album search
//! - `download`: Single track and album downloads
//! - `play`: Interactive streaming playback
//! - `tools`: Encoder check and configuration

mod download;
mod play;
mod search;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::app::{App, Inbox, Message};
use crate::catalog::CatalogClient;
use crate::config::{self, Config};
use crate::download::{AudioFormat, FfmpegEncoder, HttpFetcher};
use crate::player::MediaEngine;

pub use download::{cmd_album, cmd_download};
pub use play::cmd_play;
pub use search::cmd_search;
pub use tools::{cmd_check_tools, cmd_config};

/// Music Courier CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by the download commands
#[derive(clap::Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Output format (flac or mp3); defaults to the configured format
    #[arg(short, long)]
    pub format: Option<AudioFormat>,
    /// Target directory; defaults to the configured download directory
    #[arg(short, long)]
    pub dir: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Search the catalog
    Search {
        /// Free-text query
        query: String,
        /// Search albums instead of tracks
        #[arg(long)]
        albums: bool,
    },
    /// Download one track
    Download {
        /// Free-text query
        query: String,
        /// Pick this track id from the results instead of the first hit
        #[arg(long)]
        id: Option<u64>,
        #[command(flatten)]
        options: DownloadArgs,
    },
    /// Download every track of an album
    Album {
        /// Free-text album query
        query: String,
        /// Pick this album id from the results instead of the first hit
        #[arg(long)]
        id: Option<u64>,
        #[command(flatten)]
        options: DownloadArgs,
    },
    /// Stream a track (or a whole album) with interactive controls
    Play {
        /// Free-text query
        query: String,
        /// Play the first matching album as a playlist
        #[arg(long)]
        album: bool,
        /// Output device name; defaults to the configured device
        #[arg(long)]
        device: Option<String>,
    },
    /// Check if the external encoder is installed
    CheckTools,
    /// Show or change the configuration
    Config {
        /// Set the default download directory
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Set the default output format
        #[arg(long)]
        format: Option<AudioFormat>,
        /// Set the playback volume (0-100)
        #[arg(long)]
        volume: Option<u8>,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let config = config::load();

    match &cli.command {
        Commands::Search { query, albums } => cmd_search(&rt, config, query, *albums),
        Commands::Download { query, id, options } => {
            cmd_download(&rt, with_overrides(config, options), query, *id)
        }
        Commands::Album { query, id, options } => {
            cmd_album(&rt, with_overrides(config, options), query, *id)
        }
        Commands::Play {
            query,
            album,
            device,
        } => cmd_play(&rt, config, query, *album, device.as_deref()),
        Commands::CheckTools => cmd_check_tools(&config),
        Commands::Config {
            dir,
            format,
            volume,
        } => cmd_config(config, dir.clone(), *format, *volume),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Apply per-invocation flags on top of the loaded config.
pub(crate) fn with_overrides(mut config: Config, options: &DownloadArgs) -> Config {
    if let Some(format) = options.format {
        config.download.preferred_format = format;
    }
    if let Some(dir) = &options.dir {
        config.download.directory = dir.clone();
    }
    config
}

/// Wire the production catalog, transport and encoder into an [`App`].
pub(crate) fn build_app(
    config: Config,
    media: Box<dyn MediaEngine>,
) -> anyhow::Result<(App, Inbox)> {
    let catalog = CatalogClient::new(&config.catalog)?;
    let fetcher = HttpFetcher::new()?;
    let encoder = FfmpegEncoder::discover(config.encoder.ffmpeg_path.as_deref());
    Ok(App::new(
        config,
        Arc::new(catalog),
        Arc::new(fetcher),
        Arc::new(encoder),
        media,
    ))
}

/// Run the loop until the message `is_reply` matches arrives.
pub(crate) async fn await_reply(
    app: &mut App,
    inbox: &mut Inbox,
    is_reply: impl Fn(&Message) -> bool,
) {
    app.run(inbox, |_, msg| {
        if is_reply(msg) {
            std::ops::ControlFlow::Break(())
        } else {
            std::ops::ControlFlow::Continue(())
        }
    })
    .await;
}

/// Print installation instructions for ffmpeg
pub(crate) fn print_ffmpeg_install_instructions() {
    eprintln!("Error: ffmpeg not found (needed for MP3 output).");
    eprintln!("Install FFmpeg:");
    eprintln!("  Windows: winget install Gyan.FFmpeg");
    eprintln!("  macOS:   brew install ffmpeg");
    eprintln!("  Linux:   apt install ffmpeg");
}
