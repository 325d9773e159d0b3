//! Encoder check and configuration commands.

use std::path::PathBuf;

use crate::config::{self, Config};
use crate::download::{AudioFormat, find_ffmpeg};
use crate::error::{Result, ResultExt};
use crate::player::list_audio_devices;

use super::print_ffmpeg_install_instructions;

/// Check if ffmpeg is installed and list output devices
pub fn cmd_check_tools(config: &Config) -> anyhow::Result<()> {
    println!("Checking for required tools...\n");

    match find_ffmpeg(config.encoder.ffmpeg_path.as_deref()) {
        Some(path) => {
            println!("✓ ffmpeg found: {}", path.display());
            if let Ok(output) = std::process::Command::new(&path).arg("-version").output() {
                let version = String::from_utf8_lossy(&output.stdout);
                if let Some(first) = version.lines().next() {
                    println!("  {}", first);
                }
            }
        }
        None => {
            println!("✗ ffmpeg not found (FLAC downloads still work)");
            print_ffmpeg_install_instructions();
        }
    }

    let devices = list_audio_devices();
    if devices.is_empty() {
        println!("✗ No audio output devices");
    } else {
        println!("✓ Audio output devices:");
        for device in devices {
            println!("  {}", device);
        }
    }
    Ok(())
}

/// Print the configuration, or apply and save the given changes
pub fn cmd_config(
    config: Config,
    dir: Option<PathBuf>,
    format: Option<AudioFormat>,
    volume: Option<u8>,
) -> anyhow::Result<()> {
    if dir.is_none() && format.is_none() && volume.is_none() {
        if let Some(path) = config::config_path() {
            println!("# {}", path.display());
        }
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let config = apply_changes(config, dir, format, volume)?;
    config::save(&config)?;
    println!("Configuration saved");
    Ok(())
}

fn apply_changes(
    mut config: Config,
    dir: Option<PathBuf>,
    format: Option<AudioFormat>,
    volume: Option<u8>,
) -> Result<Config> {
    if let Some(dir) = dir {
        std::fs::create_dir_all(&dir)
            .with_context(format!("creating download directory {}", dir.display()))?;
        config.download.directory = dir;
    }
    if let Some(format) = format {
        config.download.preferred_format = format;
    }
    if let Some(volume) = volume {
        config.playback.volume = volume.min(100);
    }
    Ok(config)
}
