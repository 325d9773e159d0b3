//! Music Courier - browse a remote music catalog, stream previews and
//! download tracks as FLAC or MP3.

pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod model;
pub mod player;
pub mod queue;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("music_courier=info"))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}
